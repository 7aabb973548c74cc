pub mod node;
pub mod session;
pub mod view;
