pub mod controller;
pub mod node;
pub mod remote;
pub mod session;
