//! View controllers: panzoom, arcball and free-fly camera, all consuming
//! [`lumen_input`] mouse gesture events and producing model/view/projection
//! matrices for the frame loop to upload.

pub mod arcball;
pub mod camera;
pub mod panel;
pub mod panzoom;
pub mod viewport;

pub use arcball::Arcball;
pub use camera::Camera;
pub use panel::{Grid, GridAxis, Panel, PanelMode};
pub use panzoom::{Panzoom, Platform};
pub use viewport::{Clip, Viewport};
