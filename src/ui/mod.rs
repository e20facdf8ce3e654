// UI module - Slint window and event loop bridge
//
// - UiBridge: runs UI updates from tokio tasks on the Slint event loop
// - GuiController: binds the MainWindow callbacks to the Studio

pub mod bridge;
pub mod controller;

pub use bridge::{Enqueued, UiBridge, UiBridgeHandle};
pub use controller::GuiController;
