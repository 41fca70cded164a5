pub mod app;
pub mod shutdown;
pub mod sim;

pub use app::Application;
pub use shutdown::ShutdownManager;
