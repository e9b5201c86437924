//! Contract matching and stub/verification synthesis.
//!
//! A [`Registry`] holds an immutable, priority-ordered contract set. The stub side calls
//! [`Registry::match_request`] then [`synthesize_stub`] per inbound request; the producer
//! side calls [`synthesize_verification_case`] once per contract ahead of time and later
//! evaluates the case with [`verify`].

pub mod config;
mod error;
mod field;
pub mod generate;
mod matcher;
mod predicate;
mod registry;
mod resolve;
pub mod source;
mod stub;
mod testgen;
mod verify;

pub use accord_contracts as contracts;
pub use error::*;
pub use field::Field;
pub use matcher::{BodyPredicate, CompiledRequest, IncomingRequest, PredicateOrigin};
pub use predicate::{JsonType, Predicate};
pub use registry::{CompiledContract, Registry};
pub use resolve::{
    resolve_for_request, resolve_for_stub, resolve_for_test, Check, StubContext, TestContext,
};
pub use source::{load_registry, SourcedContract};
pub use stub::{synthesize_stub, StubResponse};
pub use testgen::{
    synthesize_all, synthesize_verification_case, Assertion, CaseOutcome, ConcreteRequest,
    VerificationCase,
};
pub use verify::{
    verify, ActualResponse, AssertionOutcome, DelegateFn, DelegateRegistry, VerificationReport,
};
