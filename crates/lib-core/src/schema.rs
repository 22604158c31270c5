pub mod attribute_type;
pub mod matching_rule;
pub mod object_class;
pub mod registries;
pub mod syntax;
pub mod system;

pub use attribute_type::{AttributeType, AttributeUsage};
pub use matching_rule::{MatchingRule, Normalizer};
pub use object_class::{ObjectClass, ObjectClassKind};
pub use registries::{Registries, RegistriesBuilder};
pub use syntax::Syntax;
