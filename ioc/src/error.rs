use crate::core::DynError;
use crate::qualifier::Qualifiers;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The member an injection point was declared on, used in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
  pub declaring_type: &'static str,
  pub name: String,
}

impl fmt::Display for Member {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}::{}", self.declaring_type, self.name)
  }
}

/// Appends " (declared by `X::y`)" when a member is known.
struct DeclaredBy<'a>(&'a Option<Member>);

impl fmt::Display for DeclaredBy<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.0 {
      Some(member) => write!(f, " (declared by `{}`)", member),
      None => Ok(()),
    }
  }
}

/// The error type of every factory operation.
#[derive(Debug, Clone, Error)]
pub enum FactoryError {
  /// No registration matches the requested type and qualifiers.
  #[error("unsatisfied dependency: no object of type `{type_name}` with qualifiers {qualifiers}{}", DeclaredBy(.member))]
  Unsatisfied {
    type_name: &'static str,
    qualifiers: Qualifiers,
    member: Option<Member>,
  },

  /// More than one registration matches the requested type and qualifiers.
  #[error("ambiguous dependency: {candidates} objects of type `{type_name}` match qualifiers {qualifiers}{}", DeclaredBy(.member))]
  Ambiguous {
    type_name: &'static str,
    qualifiers: Qualifiers,
    member: Option<Member>,
    candidates: usize,
  },

  /// Constructing, injecting or initialising an object failed.
  #[error("failed to create `{type_name}`: {error}")]
  Creation {
    type_name: &'static str,
    error: Arc<DynError>,
  },

  /// The factory was already sealed by its first resolution.
  #[error("the factory is sealed; registrations are only accepted before the first resolution")]
  Sealed,

  /// An object definition is incomplete or contradictory.
  #[error("invalid object definition: {reason}")]
  InvalidDefinition { reason: String },

  /// A scope marker other than singleton was found on a registration.
  #[error("unsupported scope `{scope}` on `{type_name}`; only singleton is supported")]
  UnsupportedScope {
    type_name: &'static str,
    scope: String,
  },

  /// The object is (transitively) required while it is being created.
  #[error("circular dependency detected while creating `{type_name}`")]
  Circular { type_name: &'static str },

  /// A resolved value could not be viewed as the requested type.
  #[error("failed to downcast, required: `{required}` actual: `{actual}`")]
  TypeMismatch {
    required: &'static str,
    actual: &'static str,
  },
}

impl FactoryError {
  /// Wraps any error as a creation failure of `type_name`.
  pub fn creation(type_name: &'static str, error: impl Into<DynError>) -> Self {
    FactoryError::Creation {
      type_name,
      error: Arc::new(error.into()),
    }
  }

  pub fn is_unsatisfied(&self) -> bool {
    matches!(self, FactoryError::Unsatisfied { .. })
  }

  pub fn is_ambiguous(&self) -> bool {
    matches!(self, FactoryError::Ambiguous { .. })
  }

  /// Attaches the declaring member to resolution failures that lack one.
  pub(crate) fn declared_by(self, declaring: &Member) -> Self {
    match self {
      FactoryError::Unsatisfied {
        type_name,
        qualifiers,
        member: None,
      } => FactoryError::Unsatisfied {
        type_name,
        qualifiers,
        member: Some(declaring.clone()),
      },
      FactoryError::Ambiguous {
        type_name,
        qualifiers,
        member: None,
        candidates,
      } => FactoryError::Ambiguous {
        type_name,
        qualifiers,
        member: Some(declaring.clone()),
        candidates,
      },
      other => other,
    }
  }
}

/// A specialized `Result` type for factory operations.
pub type Result<T, E = FactoryError> = std::result::Result<T, E>;
