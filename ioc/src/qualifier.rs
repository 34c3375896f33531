//! Qualifier tags, element markers and the qualifier matching rules.

use crate::definition::Scope;
use crate::error::{FactoryError, Result};
use std::borrow::Cow;
use std::fmt;

/// A discriminator tag attached to registrations and requests.
///
/// A qualifier is identified by its tag and an optional value, so
/// `Qualifier::named("primary")` and `Qualifier::named("backup")` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Qualifier {
  tag: Cow<'static, str>,
  value: Option<Cow<'static, str>>,
}

impl Qualifier {
  /// Carried by registrations without explicit qualifiers.
  pub const DEFAULT: Qualifier = Qualifier::new_static("Default");
  /// Wildcard: imposes no constraint of its own.
  pub const ANY: Qualifier = Qualifier::new_static("Any");

  const NAMED: &'static str = "Named";

  const fn new_static(tag: &'static str) -> Self {
    Self {
      tag: Cow::Borrowed(tag),
      value: None,
    }
  }

  pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
    Self {
      tag: tag.into(),
      value: None,
    }
  }

  pub fn with_value(
    tag: impl Into<Cow<'static, str>>,
    value: impl Into<Cow<'static, str>>,
  ) -> Self {
    Self {
      tag: tag.into(),
      value: Some(value.into()),
    }
  }

  /// Shorthand for the `Named` qualifier carrying `name`.
  pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
    Self::with_value(Self::NAMED, name)
  }

  pub fn tag(&self) -> &str {
    &self.tag
  }

  pub fn value(&self) -> Option<&str> {
    self.value.as_deref()
  }
}

impl fmt::Display for Qualifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.value {
      Some(value) => write!(f, "@{}(\"{}\")", self.tag, value),
      None => write!(f, "@{}", self.tag),
    }
  }
}

impl From<&'static str> for Qualifier {
  fn from(tag: &'static str) -> Self {
    Qualifier::new(tag)
  }
}

/// An ordered, duplicate free set of qualifiers.
///
/// Equality is set equality: insertion order is kept for display only.
#[derive(Debug, Clone, Default)]
pub struct Qualifiers(Vec<Qualifier>);

impl Qualifiers {
  pub fn new() -> Self {
    Self(Vec::new())
  }

  /// The implicit qualifier set of unqualified registrations.
  pub fn default_set() -> Self {
    Self(vec![Qualifier::DEFAULT])
  }

  /// Adds `qualifier` unless already present. Returns whether it was added.
  pub fn insert(&mut self, qualifier: Qualifier) -> bool {
    if self.contains(&qualifier) {
      return false;
    }
    self.0.push(qualifier);
    true
  }

  pub fn contains(&self, qualifier: &Qualifier) -> bool {
    self.0.iter().any(|q| q == qualifier)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Qualifier> {
    self.0.iter()
  }

  /// Empty or exactly `{Default}`.
  pub fn is_default(&self) -> bool {
    match self.0.as_slice() {
      [] => true,
      [only] => *only == Qualifier::DEFAULT,
      _ => false,
    }
  }

  /// All qualifiers of `self` followed by the ones of `other` not yet present.
  pub fn union(&self, other: &Qualifiers) -> Qualifiers {
    let mut merged = self.clone();
    for qualifier in other.iter() {
      merged.insert(qualifier.clone());
    }
    merged
  }
}

impl PartialEq for Qualifiers {
  fn eq(&self, other: &Self) -> bool {
    self.len() == other.len() && self.iter().all(|q| other.contains(q))
  }
}

impl Eq for Qualifiers {}

impl fmt::Display for Qualifiers {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("{")?;
    for (i, qualifier) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{}", qualifier)?;
    }
    f.write_str("}")
  }
}

impl FromIterator<Qualifier> for Qualifiers {
  fn from_iter<I: IntoIterator<Item = Qualifier>>(iter: I) -> Self {
    let mut qualifiers = Qualifiers::new();
    for qualifier in iter {
      qualifiers.insert(qualifier);
    }
    qualifiers
  }
}

impl<const N: usize> From<[Qualifier; N]> for Qualifiers {
  fn from(qualifiers: [Qualifier; N]) -> Self {
    qualifiers.into_iter().collect()
  }
}

impl From<Vec<Qualifier>> for Qualifiers {
  fn from(qualifiers: Vec<Qualifier>) -> Self {
    qualifiers.into_iter().collect()
  }
}

impl From<Qualifier> for Qualifiers {
  fn from(qualifier: Qualifier) -> Self {
    Qualifiers(vec![qualifier])
  }
}

impl<'a> IntoIterator for &'a Qualifiers {
  type Item = &'a Qualifier;
  type IntoIter = std::slice::Iter<'a, Qualifier>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}

/// A piece of metadata attached to a class, producer or injection point.
///
/// Only qualifier and scope markers mean anything to the factory; the rest is
/// carried for external tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
  Qualifier(Qualifier),
  /// The supported singleton scope.
  Singleton,
  /// Any other scope marker, rejected at registration.
  Scope(Cow<'static, str>),
  Other(Cow<'static, str>),
}

impl From<Qualifier> for Marker {
  fn from(qualifier: Qualifier) -> Self {
    Marker::Qualifier(qualifier)
  }
}

/// Decides whether a candidate's qualifiers satisfy a request.
///
/// - A default request (empty or `{Default}`) only matches default candidates.
/// - A request containing `Any` matches when every other requested tag is
///   present on the candidate.
/// - Otherwise the candidate must carry every requested qualifier and may
///   carry more.
pub fn matches(candidate: &Qualifiers, requested: &Qualifiers) -> bool {
  if requested.is_default() {
    return candidate.is_default();
  }
  requested
    .iter()
    .filter(|q| **q != Qualifier::ANY)
    .all(|q| candidate.contains(q))
}

/// Extracts the qualifiers from `markers` in first-seen order, without
/// duplicates. Returns an empty set when there are none.
pub fn parse_qualifiers(markers: &[Marker]) -> Qualifiers {
  markers
    .iter()
    .filter_map(|marker| match marker {
      Marker::Qualifier(qualifier) => Some(qualifier.clone()),
      _ => None,
    })
    .collect()
}

/// Reads the scope from `markers`.
///
/// `Ok(None)` when no scope marker is present. Scope markers other than
/// [`Marker::Singleton`] are an error.
pub fn parse_scope(markers: &[Marker], type_name: &'static str) -> Result<Option<Scope>> {
  let mut scope = None;
  for marker in markers {
    match marker {
      Marker::Singleton => scope = Some(Scope::Singleton),
      Marker::Scope(name) => {
        return Err(FactoryError::UnsupportedScope {
          type_name,
          scope: name.to_string(),
        })
      }
      _ => {}
    }
  }
  Ok(scope)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn q(tag: &'static str) -> Qualifier {
    Qualifier::new(tag)
  }

  #[test]
  fn default_request_matches_only_default_candidates() {
    let default_request = Qualifiers::new();
    assert!(matches(&Qualifiers::default_set(), &default_request));
    assert!(matches(&Qualifiers::new(), &default_request));
    assert!(matches(&Qualifiers::new(), &Qualifiers::default_set()));
    assert!(!matches(&Qualifiers::from([q("Fast")]), &default_request));
    assert!(!matches(
      &Qualifiers::from([Qualifier::DEFAULT, q("Fast")]),
      &Qualifiers::default_set()
    ));
  }

  #[test]
  fn explicit_request_needs_superset() {
    let candidate = Qualifiers::from([q("Fast"), q("Cheap")]);
    assert!(matches(&candidate, &Qualifiers::from([q("Fast")])));
    assert!(matches(&candidate, &Qualifiers::from([q("Cheap"), q("Fast")])));
    assert!(!matches(&candidate, &Qualifiers::from([q("Fast"), q("Good")])));
  }

  #[test]
  fn any_imposes_no_constraint_of_its_own() {
    let any = Qualifiers::from([Qualifier::ANY]);
    assert!(matches(&Qualifiers::default_set(), &any));
    assert!(matches(&Qualifiers::from([q("Fast")]), &any));

    let any_fast = Qualifiers::from([Qualifier::ANY, q("Fast")]);
    assert!(matches(&Qualifiers::from([q("Fast"), q("Cheap")]), &any_fast));
    assert!(!matches(&Qualifiers::default_set(), &any_fast));
  }

  #[test]
  fn named_qualifiers_compare_values() {
    let primary = Qualifiers::from([Qualifier::named("primary")]);
    assert!(matches(&primary, &Qualifiers::from([Qualifier::named("primary")])));
    assert!(!matches(&primary, &Qualifiers::from([Qualifier::named("backup")])));
  }

  #[test]
  fn parse_keeps_first_seen_order_without_duplicates() {
    let markers = [
      Marker::Other("Deprecated".into()),
      Marker::Qualifier(q("B")),
      Marker::Singleton,
      Marker::Qualifier(q("A")),
      Marker::Qualifier(q("B")),
    ];
    let parsed = parse_qualifiers(&markers);
    let tags: Vec<&str> = parsed.iter().map(Qualifier::tag).collect();
    assert_eq!(tags, vec!["B", "A"]);
    assert!(parse_qualifiers(&[Marker::Singleton]).is_empty());
  }

  #[test]
  fn parse_scope_rejects_unknown_scopes() {
    assert_eq!(parse_scope(&[], "T").unwrap(), None);
    assert_eq!(
      parse_scope(&[Marker::Singleton], "T").unwrap(),
      Some(Scope::Singleton)
    );
    let err = parse_scope(&[Marker::Scope("RequestScoped".into())], "T").unwrap_err();
    assert!(matches!(err, FactoryError::UnsupportedScope { .. }));
  }

  #[test]
  fn union_is_order_preserving_and_set_equal() {
    let a = Qualifiers::from([q("A"), q("B")]);
    let b = Qualifiers::from([q("B"), q("C")]);
    let ab = a.union(&b);
    let tags: Vec<&str> = ab.iter().map(Qualifier::tag).collect();
    assert_eq!(tags, vec!["A", "B", "C"]);
    assert_eq!(ab, b.union(&a));
  }
}
