pub mod easyimage;
pub mod halo;
pub mod memory;
