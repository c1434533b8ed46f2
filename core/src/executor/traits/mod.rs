pub mod callback;
pub mod renderer;

pub use callback::*;
pub use renderer::*;
