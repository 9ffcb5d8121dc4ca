//! Labels - Label Names, Label Keys, and Value Helpers
//!
//! Every metric family declares an ordered list of label names. At
//! runtime the adapters resolve an ordered list of values; the values
//! are wrapped in a [`LabelKey`] and used to look up the instrument
//! for that exact combination.

use std::fmt;
use std::sync::Arc;

/// Local endpoint of a connection (`host:port`).
pub const LOCAL: &str = "local";
/// Remote peer of a connection (`host:port`).
pub const REMOTE: &str = "remote";
/// HTTP method.
pub const METHOD: &str = "method";
/// HTTP status code.
pub const CODE: &str = "code";
/// Simple type name of an error.
pub const CLASS: &str = "class";
/// Event bus address.
pub const ADDRESS: &str = "address";
/// Event bus message side (`local` / `remote`).
pub const SIDE: &str = "side";
/// Event bus reply failure kind.
pub const FAILURE: &str = "failure";
/// Pool type (e.g. `worker`, `datasource`).
pub const POOL_TYPE: &str = "pool_type";
/// Pool name.
pub const POOL_NAME: &str = "pool_name";
/// Configured pool capacity.
pub const MAX_POOL_SIZE: &str = "max_pool_size";
/// Verticle name.
pub const NAME: &str = "name";

/// Placeholder used when an address is unknown.
pub const UNKNOWN: &str = "?";

/// Immutable, hashable tuple of label values.
///
/// Equality and hashing are order-sensitive and value-exact:
/// `("a", "b")` and `("b", "a")` are different keys.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LabelKey(Arc<[String]>);

impl LabelKey {
    /// Build a key from the first `limit` values.
    ///
    /// Values beyond the family's declared label count are ignored.
    pub fn new<S: AsRef<str>>(values: &[S], limit: usize) -> Self {
        let values: Vec<String> = values
            .iter()
            .take(limit)
            .map(|v| v.as_ref().to_string())
            .collect();
        Self(values.into())
    }

    /// The label values in declaration order.
    pub fn values(&self) -> &[String] {
        &self.0
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key holds no values (family without labels).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Format a socket address as a label value (`host:port`).
///
/// A missing host renders as `?`, matching how unresolved local
/// addresses are reported by the runtime.
pub fn from_address(host: Option<&str>, port: u16) -> String {
    format!("{}:{}", host.unwrap_or(UNKNOWN), port)
}

/// Label value for the side a message was sent from.
pub fn side(local: bool) -> &'static str {
    if local { "local" } else { "remote" }
}

/// Pointer and trait-object wrappers that `error_class` looks through.
const WRAPPERS: [&str; 3] = ["Box", "Arc", "Rc"];

/// Simple type name of a value, used as the `class` label.
///
/// Strips the module path and any generic arguments, so
/// `std::io::error::Error` becomes `Error` and
/// `my_app::HandlerFailure<u8>` becomes `HandlerFailure`. `Box`, `Arc`
/// and `Rc` are unwrapped and a trait object reports its trait, so
/// `Box<dyn std::error::Error + Send + Sync>` becomes `Error`.
///
/// The name is resolved statically. Callers that know the runtime
/// variant should pass their own classifier to
/// [`VertxEventBusMetrics::measure_with`](crate::adapters::vertx::VertxEventBusMetrics::measure_with).
pub fn error_class<E: ?Sized>(_error: &E) -> String {
    simple_name(std::any::type_name::<E>()).to_string()
}

fn simple_name(full: &str) -> &str {
    let mut name = full.trim();
    loop {
        name = name.trim_start_matches('&').trim_start();
        name = name.strip_prefix("mut ").unwrap_or(name);
        if let Some(object) = name.strip_prefix("dyn ") {
            name = object.split(" + ").next().unwrap_or(object).trim();
        }

        let (path, argument) = match name.find('<') {
            Some(start) => (&name[..start], first_argument(&name[start + 1..])),
            None => (name, None),
        };
        let base = path.rsplit("::").next().unwrap_or(path);
        match argument {
            Some(inner) if WRAPPERS.contains(&base) => name = inner,
            _ => return base,
        }
    }
}

/// First top-level argument of a generic list, without the opening `<`.
fn first_argument(arguments: &str) -> Option<&str> {
    let mut depth = 0usize;
    for (i, c) in arguments.char_indices() {
        match c {
            '<' => depth += 1,
            '>' | ',' if depth == 0 => return Some(arguments[..i].trim()),
            '>' => depth -= 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_label_key_is_order_sensitive() {
        let ab = LabelKey::new(&["a", "b"], 2);
        let ba = LabelKey::new(&["b", "a"], 2);
        assert_ne!(ab, ba);

        let mut set = HashSet::new();
        set.insert(ab.clone());
        assert!(set.contains(&LabelKey::new(&["a", "b"], 2)));
        assert!(!set.contains(&ba));
    }

    #[test]
    fn test_label_key_ignores_extra_values() {
        let key = LabelKey::new(&["a", "b", "c"], 2);
        assert_eq!(key.values(), &["a".to_string(), "b".to_string()]);
        assert_eq!(key, LabelKey::new(&["a", "b", "zzz"], 2));
    }

    #[test]
    fn test_label_key_keeps_short_tuples() {
        let key = LabelKey::new(&["a"], 3);
        assert_eq!(key.len(), 1);
        assert_ne!(key, LabelKey::new(&["a", "b"], 3));
    }

    #[test]
    fn test_from_address() {
        assert_eq!(from_address(Some("127.0.0.1"), 8080), "127.0.0.1:8080");
        assert_eq!(from_address(None, 0), "?:0");
    }

    #[test]
    fn test_side() {
        assert_eq!(side(true), "local");
        assert_eq!(side(false), "remote");
    }

    #[derive(Debug)]
    struct HandlerFailure<T>(T);

    #[test]
    fn test_error_class_strips_path_and_generics() {
        let io = std::io::Error::other("boom");
        assert_eq!(error_class(&io), "Error");
        assert_eq!(error_class(&HandlerFailure(1u8)), "HandlerFailure");
    }

    #[test]
    fn test_error_class_looks_through_wrappers() {
        let boxed: Box<dyn std::error::Error + Send + Sync> =
            Box::new(std::io::Error::other("boom"));
        assert_eq!(error_class(&boxed), "Error");
        assert_eq!(error_class(&Box::new(HandlerFailure(1u8))), "HandlerFailure");
        assert_eq!(
            error_class(&std::sync::Arc::new(HandlerFailure(1u8))),
            "HandlerFailure"
        );
        assert_eq!(
            error_class(&std::rc::Rc::new(Box::new(HandlerFailure(1u8)))),
            "HandlerFailure"
        );
    }

    #[test]
    fn test_simple_name_of_nested_generics() {
        assert_eq!(
            simple_name("alloc::boxed::Box<app::Wrapped<alloc::vec::Vec<u8>, u8>>"),
            "Wrapped"
        );
        assert_eq!(simple_name("&dyn core::error::Error"), "Error");
        assert_eq!(simple_name("alloc::sync::Arc<"), "Arc");
    }
}
