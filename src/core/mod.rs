/*!
 * Execution policies shared by every facade operation
 */

pub mod retry;

pub use retry::RetryPolicy;
