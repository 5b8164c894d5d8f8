//! Derived value pipeline
//!
//! Pure functions over already-resolved values. No I/O happens here, so the
//! whole pipeline can be exercised without a backend.

use crate::error::{DeriveError, ExportError, ResolveError};
use crate::model::{DeriveFn, DerivedOutput, Reference, Variables};
use crate::resolve::{Resolved, Scope, resolve_value};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of `input`
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

impl DeriveFn {
    /// Apply the function. The result is secret if any argument is.
    pub fn apply(&self, args: &[Resolved]) -> Result<Resolved, DeriveError> {
        let secret = args.iter().any(|a| a.secret);

        let value = match self {
            DeriveFn::Sha256Hex => {
                let [arg] = self.exactly_one(args)?;
                serde_json::Value::String(sha256_hex(&arg.as_text()))
            }
            DeriveFn::Concat => {
                serde_json::Value::String(args.iter().map(Resolved::as_text).collect())
            }
            DeriveFn::Secret => {
                let [arg] = self.exactly_one(args)?;
                return Ok(Resolved::secret(arg.value.clone()));
            }
        };

        Ok(Resolved { value, secret })
    }

    fn exactly_one<'a>(&self, args: &'a [Resolved]) -> Result<&'a [Resolved; 1], DeriveError> {
        args.try_into().map_err(|_| DeriveError::Arity {
            function: self.to_string(),
            expected: 1,
            actual: args.len(),
        })
    }
}

/// Derived values computed for one run, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedValues {
    values: IndexMap<String, Resolved>,
}

impl DerivedValues {
    pub fn get(&self, name: &str) -> Option<&Resolved> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Scope that adds `derived.<name>` on top of another scope
pub struct DerivedScope<'a> {
    inner: &'a dyn Scope,
    derived: &'a DerivedValues,
}

impl<'a> DerivedScope<'a> {
    pub fn new(inner: &'a dyn Scope, derived: &'a DerivedValues) -> Self {
        Self { inner, derived }
    }
}

impl Scope for DerivedScope<'_> {
    fn variable(&self, name: &str) -> Option<&serde_json::Value> {
        self.inner.variable(name)
    }

    fn attribute(&self, reference: &Reference) -> Result<Resolved, ResolveError> {
        if !reference.is_derived() {
            return self.inner.attribute(reference);
        }
        let name = reference.path_string();
        self.derived
            .get(&name)
            .cloned()
            .ok_or(ResolveError::UnknownDerived(name))
    }
}

/// Evaluate derived outputs in declaration order.
///
/// Later outputs may use earlier ones through `derived.<name>`.
pub fn compute_derived(
    outputs: &[DerivedOutput],
    scope: &dyn Scope,
) -> Result<DerivedValues, ExportError> {
    let mut derived = DerivedValues::default();

    for output in outputs {
        let args = {
            let scoped = DerivedScope::new(scope, &derived);
            output
                .args
                .iter()
                .map(|arg| resolve_value(arg, &scoped))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| export_resolve_error(&output.name, source))?
        };

        let mut value = output
            .function
            .apply(&args)
            .map_err(|source| ExportError::Derivation {
                name: output.name.clone(),
                source,
            })?;
        value.secret |= output.secret;

        tracing::debug!(
            "Derived output {} computed via {} (secret: {})",
            output.name,
            output.function,
            value.secret
        );
        derived.values.insert(output.name.clone(), value);
    }

    Ok(derived)
}

/// Map a resolution failure onto the export taxonomy: references to
/// resources that never applied become `UnresolvedExport`
pub(crate) fn export_resolve_error(name: &str, source: ResolveError) -> ExportError {
    match source {
        ResolveError::UnresolvedReference(target) => ExportError::UnresolvedExport {
            export: name.to_string(),
            source_name: target,
        },
        other => ExportError::Resolve {
            name: name.to_string(),
            source: other,
        },
    }
}

/// Variables-only scope, for evaluating derived values with no resources
pub struct VariableScope<'a>(pub &'a Variables);

impl Scope for VariableScope<'_> {
    fn variable(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    fn attribute(&self, reference: &Reference) -> Result<Resolved, ResolveError> {
        Err(ResolveError::UnknownResource(reference.target.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;
    use serde_json::json;

    #[test]
    fn test_sha256_hex_known_vector() {
        // Standard SHA-256 of the empty string and of "abc"
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_hex_deterministic() {
        let first = sha256_hex("t0ken");
        let second = sha256_hex("t0ken");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(first, sha256_hex("t0ken "));
    }

    #[test]
    fn test_secret_is_sticky() {
        let digest = DeriveFn::Sha256Hex
            .apply(&[Resolved::secret(json!("t0ken"))])
            .unwrap();
        assert!(digest.secret);
        assert_eq!(digest.value, json!(sha256_hex("t0ken")));

        let plain = DeriveFn::Sha256Hex
            .apply(&[Resolved::plain(json!("t0ken"))])
            .unwrap();
        assert!(!plain.secret);
        assert_eq!(plain.value, digest.value);
    }

    #[test]
    fn test_concat() {
        let endpoint = DeriveFn::Concat
            .apply(&[
                Resolved::plain(json!("https://")),
                Resolved::plain(json!("acct")),
                Resolved::plain(json!(".r2.cloudflarestorage.com")),
            ])
            .unwrap();
        assert_eq!(endpoint.value, json!("https://acct.r2.cloudflarestorage.com"));
        assert!(!endpoint.secret);

        let with_number = DeriveFn::Concat
            .apply(&[Resolved::plain(json!("port-")), Resolved::plain(json!(8080))])
            .unwrap();
        assert_eq!(with_number.value, json!("port-8080"));
    }

    #[test]
    fn test_secret_function_forces_classification() {
        let out = DeriveFn::Secret.apply(&[Resolved::plain(json!("x"))]).unwrap();
        assert!(out.secret);
        assert_eq!(out.value, json!("x"));
    }

    #[test]
    fn test_arity_error() {
        let err = DeriveFn::Sha256Hex.apply(&[]).unwrap_err();
        assert_eq!(
            err,
            DeriveError::Arity {
                function: "sha256-hex".to_string(),
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn test_compute_chained() {
        let vars = Variables::from([("accountId".to_string(), json!("acct"))]);
        let outputs = vec![
            DerivedOutput::new(
                "endpoint",
                DeriveFn::Concat,
                vec![Value::literal("https://"), Value::var("accountId")],
            ),
            DerivedOutput::new(
                "endpoint_hash",
                DeriveFn::Sha256Hex,
                vec![Value::reference("derived", "endpoint")],
            )
            .secret(),
        ];

        let derived = compute_derived(&outputs, &VariableScope(&vars)).unwrap();
        assert_eq!(derived.len(), 2);
        assert_eq!(derived.get("endpoint").unwrap().value, json!("https://acct"));

        let hash = derived.get("endpoint_hash").unwrap();
        assert!(hash.secret);
        assert_eq!(hash.value, json!(sha256_hex("https://acct")));
    }
}
