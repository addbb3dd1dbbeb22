//! Typed rows and request payloads for every business area.

pub mod access;
pub mod calls;
pub mod notifications;
pub mod org;
pub mod partners;
pub mod reports;
pub mod sales;
pub mod tasks;

pub use access::*;
pub use calls::*;
pub use notifications::*;
pub use org::*;
pub use partners::*;
pub use reports::*;
pub use sales::*;
pub use tasks::*;
