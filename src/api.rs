pub mod auth;
pub mod session;
pub mod suggestion;
pub mod swagger_main;
pub mod task;
#[cfg(test)]
pub mod test_util;
pub mod time_entry;
pub mod timer;
