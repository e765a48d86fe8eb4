pub mod deposit;
pub mod fraud;
pub mod notify;

pub use deposit::DepositService;
pub use notify::SmsNotifier;
