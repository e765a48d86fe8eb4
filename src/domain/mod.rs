pub mod transaction;
pub mod user;

pub use transaction::Transaction;
pub use user::User;
