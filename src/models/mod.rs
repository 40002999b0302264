pub mod entitlement;
pub mod idea;
pub mod payment;
pub mod responses;

pub use entitlement::*;
pub use idea::*;
pub use payment::*;
pub use responses::*;
