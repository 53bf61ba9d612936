mod executor;

pub use executor::{execute_post, ExecutorError, PublishError, MAX_ATTEMPTS_MESSAGE};
