pub mod caps;
pub mod sso;
pub mod view;
