pub mod approval;
pub mod material;
pub mod notification;
pub mod request;
pub mod user;
