//! Social graph support for conquest scoping.

pub mod friends;

pub use friends::FriendGraph;
