//! Windowing, GUI overlay hook and the presenter/request-router that sit
//! between the client application and the GPU-backed canvas/resource layer.

pub mod client;
pub mod gui;
pub mod presenter;

pub use client::{Client, ClientWindow};
pub use gui::GuiOverlay;
pub use presenter::{CanvasEntry, GraphicsPipeline, Presenter, PresenterError};
