pub mod screen;

pub use screen::BluetoothScreen;
