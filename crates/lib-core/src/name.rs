pub mod ava;
pub mod dn;
pub mod parser;
pub mod rdn;

pub use ava::Ava;
pub use dn::Dn;
pub use rdn::Rdn;
