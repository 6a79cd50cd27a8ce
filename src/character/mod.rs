pub mod age;
pub mod examples;
pub mod options;
pub mod record;

pub use examples::ExampleLibrary;
pub use record::{field_spec, CharacterRecord, FieldInput, FieldKind, FieldSpec, FIELDS};
