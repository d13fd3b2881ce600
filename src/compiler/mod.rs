//! Spec document → operation descriptor compilation
//!
//! ```text
//! document ──► swagger::normalize (Swagger 2.0 only)
//!          ──► spec::compile_spec ──► operation::OperationCompiler (per path × method)
//!                                          └─► schema::translate (parameters, body, response)
//! ```

pub mod descriptor;
pub mod operation;
pub mod schema;
pub mod spec;
pub mod swagger;

pub use descriptor::{
    BodyStyle, Field, HttpMethod, OperationDescriptor, Parameter, ParameterLocation,
    ParameterShape, SpecIdentity, TypeShape,
};
pub use operation::{CompileContext, OperationCompiler};
pub use schema::translate;
pub use spec::{SpecKind, compile_spec};
