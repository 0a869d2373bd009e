pub mod attribution;
pub mod order;
pub mod pix;
