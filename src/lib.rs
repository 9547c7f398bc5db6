pub mod blur;
pub mod cache;
pub mod compositor;
pub mod config;
pub mod controller;
pub mod energy;
pub mod error;
pub mod mask;
pub mod noise;
pub mod pixels;
pub mod plan;
pub mod regions;
pub mod scheduler;
pub mod shapes;
pub mod text;
pub mod turbulence;

pub use config::RenderConfig;
pub use controller::{Phase, RenderController};
pub use error::MosaicError;
pub use plan::{Plan, Tile};
pub use regions::ShapeKind;
pub use shapes::ShapeSource;
