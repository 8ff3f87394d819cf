use crate::database::path;
use crate::database::query::QueryParams;
use crate::database::FirebaseDatabase;
use serde_json::Value;
use std::fmt;

/// An immutable location in the database, optionally narrowed by query
/// modifiers. Every builder method returns a new reference.
#[derive(Clone)]
pub struct Reference {
    pub(crate) database: FirebaseDatabase,
    pub(crate) path: String,
    pub(crate) query: QueryParams,
}

impl Reference {
    pub(crate) fn new(database: FirebaseDatabase, path: String) -> Self {
        Self {
            database,
            path,
            query: QueryParams::default(),
        }
    }

    /// Last path segment, `None` at the root.
    pub fn key(&self) -> Option<&str> {
        path::key(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn database(&self) -> &FirebaseDatabase {
        &self.database
    }

    pub fn child(&self, child: &str) -> Reference {
        Reference::new(self.database.clone(), path::join(&self.path, child))
    }

    /// `None` at the root.
    pub fn parent(&self) -> Option<Reference> {
        path::parent(&self.path).map(|p| Reference::new(self.database.clone(), p.to_string()))
    }

    pub fn root(&self) -> Reference {
        self.database.root()
    }

    /// Replaces all modifiers at once.
    pub fn with_query(&self, query: QueryParams) -> Reference {
        Reference {
            query,
            ..self.clone()
        }
    }

    fn modify(&self, f: impl FnOnce(QueryParams) -> QueryParams) -> Reference {
        self.with_query(f(self.query.clone()))
    }

    pub fn order_by_child(&self, child: &str) -> Reference {
        self.modify(|q| q.order_by_child(child))
    }

    pub fn order_by_key(&self) -> Reference {
        self.modify(QueryParams::order_by_key)
    }

    pub fn order_by_priority(&self) -> Reference {
        self.modify(QueryParams::order_by_priority)
    }

    pub fn order_by_value(&self) -> Reference {
        self.modify(QueryParams::order_by_value)
    }

    pub fn start_at(&self, value: impl Into<Value>) -> Reference {
        self.modify(|q| q.start_at(value))
    }

    pub fn end_at(&self, value: impl Into<Value>) -> Reference {
        self.modify(|q| q.end_at(value))
    }

    pub fn equal_to(&self, value: impl Into<Value>) -> Reference {
        self.modify(|q| q.equal_to(value))
    }

    pub fn limit_to_first(&self, limit: u32) -> Reference {
        self.modify(|q| q.limit_to_first(limit))
    }

    pub fn limit_to_last(&self, limit: u32) -> Reference {
        self.modify(|q| q.limit_to_last(limit))
    }

    /// Same database instance, same path and the same encoded modifiers.
    pub fn is_equal(&self, other: &Reference) -> bool {
        self.database.same_instance(&other.database)
            && self.path == other.path
            && self.query.to_rest_params() == other.query.to_rest_params()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.database.location(&self.path))
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("url", &self.to_string())
            .field("query", &self.query)
            .finish()
    }
}
