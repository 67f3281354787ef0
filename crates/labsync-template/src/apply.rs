//! Struct template application
//!
//! [`Templated`] is implemented by every type whose string content may carry
//! placeholders. Records list their fields through [`impl_templated!`]; the
//! container impls below cover optional values, sequences and string-keyed
//! maps.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::TemplateError;
use crate::params::Parameters;
use crate::resolve::Resolver;
use crate::vars::Variables;

/// A value whose strings can be resolved in place
///
/// A failure aborts the walk; fields visited before it may already be
/// rewritten, so callers always work on a copy.
pub trait Templated {
    /// Resolve every string reachable from `self`
    ///
    /// # Errors
    /// Returns the first `TemplateError` raised by the resolver
    fn apply_templates(&mut self, resolver: &Resolver<'_>) -> Result<(), TemplateError>;
}

impl Templated for String {
    fn apply_templates(&mut self, resolver: &Resolver<'_>) -> Result<(), TemplateError> {
        resolver.resolve_in_place(self)
    }
}

impl<T: Templated> Templated for Option<T> {
    fn apply_templates(&mut self, resolver: &Resolver<'_>) -> Result<(), TemplateError> {
        match self {
            Some(inner) => inner.apply_templates(resolver),
            None => Ok(()),
        }
    }
}

impl<T: Templated + ?Sized> Templated for Box<T> {
    fn apply_templates(&mut self, resolver: &Resolver<'_>) -> Result<(), TemplateError> {
        (**self).apply_templates(resolver)
    }
}

impl<T: Templated> Templated for Vec<T> {
    fn apply_templates(&mut self, resolver: &Resolver<'_>) -> Result<(), TemplateError> {
        for item in self.iter_mut() {
            item.apply_templates(resolver)?;
        }
        Ok(())
    }
}

impl<T: Templated> Templated for BTreeMap<String, T> {
    fn apply_templates(&mut self, resolver: &Resolver<'_>) -> Result<(), TemplateError> {
        for (key, value) in self.iter_mut() {
            value
                .apply_templates(resolver)
                .map_err(|e| map_entry_error(key, e))?;
        }
        Ok(())
    }
}

impl<T: Templated, S: std::hash::BuildHasher> Templated for HashMap<String, T, S> {
    fn apply_templates(&mut self, resolver: &Resolver<'_>) -> Result<(), TemplateError> {
        for (key, value) in self.iter_mut() {
            value
                .apply_templates(resolver)
                .map_err(|e| map_entry_error(key, e))?;
        }
        Ok(())
    }
}

fn map_entry_error(key: &str, error: TemplateError) -> TemplateError {
    match error {
        // nested maps report the innermost key only
        TemplateError::MapEntry { .. } => error,
        other => TemplateError::MapEntry {
            key: key.to_string(),
            source: Box::new(other),
        },
    }
}

macro_rules! impl_templated_noop {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Templated for $ty {
                fn apply_templates(&mut self, _resolver: &Resolver<'_>) -> Result<(), TemplateError> {
                    Ok(())
                }
            }
        )*
    };
}

impl_templated_noop!(bool, u8, u16, u32, u64, usize, i32, i64, f64);

/// Implement [`Templated`] for a record by visiting the listed fields in order
///
/// ```
/// use labsync_template::impl_templated;
///
/// struct Endpoint {
///     host: String,
///     port: u16,
///     tags: Vec<String>,
/// }
///
/// impl_templated!(Endpoint { host, tags });
/// ```
#[macro_export]
macro_rules! impl_templated {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::Templated for $ty {
            fn apply_templates(
                &mut self,
                resolver: &$crate::Resolver<'_>,
            ) -> ::std::result::Result<(), $crate::TemplateError> {
                let _ = resolver;
                $( $crate::Templated::apply_templates(&mut self.$field, resolver)?; )*
                Ok(())
            }
        }
    };
}

/// Applies templates to objects using a shared variable store
#[derive(Debug, Clone)]
pub struct TemplateApplier {
    variables: Arc<Variables>,
    parameters: Option<Parameters>,
}

impl TemplateApplier {
    /// Create an applier over `variables` with optional default parameters
    #[must_use]
    pub fn new(variables: Arc<Variables>, parameters: Option<Parameters>) -> Self {
        Self {
            variables,
            parameters,
        }
    }

    /// Resolve every string inside `obj` with the default parameters
    ///
    /// # Errors
    /// Returns the first `TemplateError` raised during the walk
    pub fn apply<T: Templated + ?Sized>(&self, obj: &mut T) -> Result<(), TemplateError> {
        let resolver = Resolver::new(&self.variables, self.parameters.as_ref(), None);
        obj.apply_templates(&resolver)
    }

    /// Resolve every string inside `obj` with explicit parameter and meta sets
    ///
    /// # Errors
    /// Returns the first `TemplateError` raised during the walk
    pub fn apply_with_parameters<T: Templated + ?Sized>(
        &self,
        obj: &mut T,
        parameters: &Parameters,
        meta: Option<&Parameters>,
    ) -> Result<(), TemplateError> {
        let resolver = Resolver::new(&self.variables, Some(parameters), meta);
        obj.apply_templates(&resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Inner {
        value: String,
        count: u32,
    }

    impl_templated!(Inner { value, count });

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Outer {
        name: String,
        inner: Option<Inner>,
        boxed: Option<Box<Inner>>,
        list: Vec<String>,
        labels: BTreeMap<String, String>,
        nested: HashMap<String, Inner>,
        untouched: String,
    }

    impl_templated!(Outer { name, inner, boxed, list, labels, nested });

    fn applier() -> TemplateApplier {
        let mut vars = Variables::new(None);
        vars.set("name", "alice");
        vars.set("greeting", "hello");
        TemplateApplier::new(Arc::new(vars), None)
    }

    #[test]
    fn test_apply_walks_every_shape() {
        let mut obj = Outer {
            name: "$(var.name)".to_string(),
            inner: Some(Inner {
                value: "$(var.greeting) world".to_string(),
                count: 3,
            }),
            boxed: Some(Box::new(Inner {
                value: "boxed $(var.name)".to_string(),
                count: 0,
            })),
            list: vec!["$(var.greeting)".to_string(), "plain".to_string()],
            labels: BTreeMap::from([("owner".to_string(), "$(var.name)".to_string())]),
            nested: HashMap::from([(
                "k".to_string(),
                Inner {
                    value: "$(var.name)".to_string(),
                    count: 1,
                },
            )]),
            untouched: "$(var.name)".to_string(),
        };

        applier().apply(&mut obj).unwrap();

        assert_eq!(obj.name, "alice");
        assert_eq!(obj.inner.as_ref().unwrap().value, "hello world");
        assert_eq!(obj.inner.as_ref().unwrap().count, 3);
        assert_eq!(obj.boxed.as_ref().unwrap().value, "boxed alice");
        assert_eq!(obj.list, vec!["hello", "plain"]);
        assert_eq!(obj.labels["owner"], "alice");
        assert_eq!(obj.nested["k"].value, "alice");
        // fields not listed are not visited
        assert_eq!(obj.untouched, "$(var.name)");
    }

    #[test]
    fn test_apply_tolerates_empty_values() {
        let mut obj = Outer::default();
        applier().apply(&mut obj).unwrap();
        assert_eq!(obj, Outer::default());

        let mut none: Option<Outer> = None;
        applier().apply(&mut none).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_map_error_names_key() {
        let mut labels = BTreeMap::from([("bad".to_string(), "$(var.nope)".to_string())]);
        let err = applier().apply(&mut labels).unwrap_err();

        match err {
            TemplateError::MapEntry { key, source } => {
                assert_eq!(key, "bad");
                assert!(matches!(*source, TemplateError::Unresolved { keys } if keys == ["var.nope"]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_apply_with_parameters_and_meta() {
        let mut obj = Inner {
            value: "$(name)-$(param.port)-$(var.greeting)".to_string(),
            count: 0,
        };
        let params = Parameters::new("params").with("port", "8080");
        let meta = Parameters::new("meta").with("name", "svc");

        applier()
            .apply_with_parameters(&mut obj, &params, Some(&meta))
            .unwrap();
        assert_eq!(obj.value, "svc-8080-hello");
    }

    #[test]
    fn test_failure_leaves_source_intact_when_applied_to_copy() {
        let source = Outer {
            name: "$(var.name)".to_string(),
            list: vec!["$(var.missing)".to_string()],
            ..Outer::default()
        };
        let mut copy = source.clone();

        assert!(applier().apply(&mut copy).is_err());
        assert_eq!(source.name, "$(var.name)");
        assert_eq!(copy.name, "alice");
    }
}
