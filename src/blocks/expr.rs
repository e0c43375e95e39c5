//! Attribute expressions.
//!
//! An [`Expr`] is a literal JSON-like value in which any object of the form
//! `{"query_jq": "<query>"}` stands for a query evaluated against the block's
//! evaluation context. Queries may be nested anywhere inside a literal.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Object key that marks an embedded query.
pub const QUERY_KEY: &str = "query_jq";

/// An unevaluated attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Expr(Value);

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn query(query: impl Into<String>) -> Self {
        let mut map = serde_json::Map::new();
        map.insert(QUERY_KEY.to_string(), Value::String(query.into()));
        Self(Value::Object(map))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns the query text when the whole expression is a single query.
    pub fn as_query(&self) -> Option<&str> {
        as_query(&self.0)
    }

    /// Whether evaluating this expression requires the query collaborator at all.
    pub fn is_constant(&self) -> bool {
        !contains_query(&self.0)
    }
}

/// Returns the query text if `value` is a `{"query_jq": "..."}` marker object.
pub fn as_query(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(QUERY_KEY).and_then(Value::as_str),
        _ => None,
    }
}

fn contains_query(value: &Value) -> bool {
    if as_query(value).is_some() {
        return true;
    }
    match value {
        Value::Array(items) => items.iter().any(contains_query),
        Value::Object(map) => map.values().any(contains_query),
        _ => false,
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_query() {
            Some(query) => write!(f, "query_jq({query:?})"),
            None => write!(f, "{}", self.0),
        }
    }
}

/// One `name = expression` declaration from a `vars` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarDecl {
    pub name: String,
    pub expr: Expr,
}

impl VarDecl {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

/// Variable declarations in declaration order.
///
/// Deserialized from a map; entry order is taken from the source document, not
/// sorted, because later declarations may read earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VarDecls(pub Vec<VarDecl>);

impl<'de> Deserialize<'de> for VarDecls {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVars;

        impl<'de> Visitor<'de> for OrderedVars {
            type Value = VarDecls;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of variable names to expressions")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(VarDecls::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut decls = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, expr)) = access.next_entry::<String, Expr>()? {
                    decls.push(VarDecl::new(name, expr));
                }
                Ok(VarDecls(decls))
            }
        }

        deserializer.deserialize_any(OrderedVars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_marker_detection() {
        let expr = Expr::query(".vars.a");
        assert_eq!(expr.as_query(), Some(".vars.a"));
        assert!(!expr.is_constant());

        let nested = Expr::from_value(serde_json::json!({"x": [1, {"query_jq": ".a"}]}));
        assert_eq!(nested.as_query(), None);
        assert!(!nested.is_constant());

        // A map with extra keys is a plain literal
        let literal = Expr::from_value(serde_json::json!({"query_jq": ".a", "other": 1}));
        assert!(literal.is_constant());
    }

    #[test]
    fn test_vars_keep_declaration_order() {
        let yaml = "zeta: 1\nalpha: {query_jq: .vars.zeta}\nmid: x\n";
        let decls: VarDecls = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<_> = decls.0.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(decls.0[1].expr.as_query(), Some(".vars.zeta"));
    }

    #[test]
    fn test_vars_order_from_json() {
        let decls: VarDecls = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        assert_eq!(decls.0[0].name, "b");
        assert_eq!(decls.0[1].name, "a");
    }
}
