pub mod notification;
pub mod toast;
