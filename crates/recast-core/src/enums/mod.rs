//! Enum-backed attributes.
//!
//! An enum attribute maps a small stored domain (usually integers or short
//! strings) onto named labels, casting strictly in both directions, and
//! generates named predicate and scope methods per label. Generated methods
//! live in an explicit per-model method table - there is no name-based
//! method synthesis at call time.

use std::collections::BTreeMap;
use std::sync::Arc;

use recast_commons::errors::DeclarationError;
use recast_commons::models::{AttributeName, Value};

use crate::error::RecastError;
use crate::registry::model::Model;
use crate::registry::pending::AttributeDefault;
use crate::types::TypeDescriptor;

/// Frozen ordered label -> stored-value mapping for one enum attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMapping {
    pairs: Vec<(String, Value)>,
}

impl EnumMapping {
    /// Builds and validates a mapping from explicit pairs.
    pub fn from_pairs(
        attribute: &AttributeName,
        pairs: Vec<(String, Value)>,
    ) -> Result<Self, DeclarationError> {
        if pairs.is_empty() {
            return Err(DeclarationError::EmptyEnumMapping {
                attribute: attribute.to_string(),
            });
        }
        for (index, (label, _)) in pairs.iter().enumerate() {
            if pairs[..index].iter().any(|(prior, _)| prior == label) {
                return Err(DeclarationError::DuplicateEnumLabel {
                    attribute: attribute.to_string(),
                    label: label.clone(),
                });
            }
        }
        Ok(Self { pairs })
    }

    /// Builds a mapping from ordered labels, assigning positional integers.
    pub fn ordinal(
        attribute: &AttributeName,
        labels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, DeclarationError> {
        let pairs = labels
            .into_iter()
            .enumerate()
            .map(|(index, label)| (label.into(), Value::Integer(index as i64)))
            .collect();
        Self::from_pairs(attribute, pairs)
    }

    pub fn label_for(&self, stored: &Value) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(_, value)| value == stored)
            .map(|(label, _)| label.as_str())
    }

    pub fn value_for(&self, label: &str) -> Option<&Value> {
        self.pairs
            .iter()
            .find(|(candidate, _)| candidate == label)
            .map(|(_, value)| value)
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.value_for(label).is_some()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pairs
            .iter()
            .map(|(label, value)| (label.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// One entry in a model's generated-method table.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedMethod {
    /// Attribute reader
    Reader { attribute: AttributeName },

    /// Attribute writer (`name=`)
    Writer { attribute: AttributeName },

    /// Class-level label-set accessor (the pluralized enum name)
    LabelSet { attribute: AttributeName },

    /// Instance predicate comparing against one stored value
    Predicate {
        attribute: AttributeName,
        stored: Value,
    },

    /// Query scope filtering by one stored value
    Scope {
        attribute: AttributeName,
        stored: Value,
        negated: bool,
    },
}

impl GeneratedMethod {
    pub fn kind_name(&self) -> &'static str {
        match self {
            GeneratedMethod::Reader { .. } => "reader",
            GeneratedMethod::Writer { .. } => "writer",
            GeneratedMethod::LabelSet { .. } => "label set",
            GeneratedMethod::Predicate { .. } => "predicate",
            GeneratedMethod::Scope { .. } => "scope",
        }
    }

    pub fn attribute(&self) -> &AttributeName {
        match self {
            GeneratedMethod::Reader { attribute }
            | GeneratedMethod::Writer { attribute }
            | GeneratedMethod::LabelSet { attribute }
            | GeneratedMethod::Predicate { attribute, .. }
            | GeneratedMethod::Scope { attribute, .. } => attribute,
        }
    }

    /// Whether `other` redefines the same method from the same declaration
    /// source (same kind, same attribute), which is allowed to overwrite.
    pub fn same_source(&self, other: &GeneratedMethod) -> bool {
        self.kind_name() == other.kind_name() && self.attribute() == other.attribute()
    }
}

/// Namespace a generated method is dispatched in.
///
/// Predicates and accessors are instance methods; scopes and label sets are
/// class-level, so a predicate and a scope may legitimately share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodNamespace {
    Instance,
    ClassLevel,
}

/// Explicit dispatch table for generated methods.
#[derive(Debug, Default)]
pub struct MethodTable {
    instance: BTreeMap<String, GeneratedMethod>,
    class_level: BTreeMap<String, GeneratedMethod>,
}

impl MethodTable {
    fn map(&self, namespace: MethodNamespace) -> &BTreeMap<String, GeneratedMethod> {
        match namespace {
            MethodNamespace::Instance => &self.instance,
            MethodNamespace::ClassLevel => &self.class_level,
        }
    }

    pub fn get(&self, namespace: MethodNamespace, name: &str) -> Option<&GeneratedMethod> {
        self.map(namespace).get(name)
    }

    /// Rejects `method` if `name` is taken by a different source.
    pub fn check(
        &self,
        namespace: MethodNamespace,
        name: &str,
        method: &GeneratedMethod,
    ) -> Result<(), DeclarationError> {
        match self.map(namespace).get(name) {
            Some(existing) if !existing.same_source(method) => {
                Err(DeclarationError::MethodConflict {
                    method: name.to_string(),
                    existing: existing.kind_name().to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn insert(&mut self, namespace: MethodNamespace, name: String, method: GeneratedMethod) {
        match namespace {
            MethodNamespace::Instance => self.instance.insert(name, method),
            MethodNamespace::ClassLevel => self.class_level.insert(name, method),
        };
    }
}

/// Builder for one enum attribute declaration.
///
/// Created by [`Model::enum_attribute`]; nothing is installed until
/// [`declare`](Self::declare) runs, and a declaration-time error installs
/// nothing at all.
pub struct EnumDeclaration<'a> {
    model: &'a Model,
    attribute: AttributeName,
    pairs: Vec<(String, Value)>,
    prefix: Affix,
    suffix: Affix,
    scopes: bool,
    default: AttributeDefault,
}

#[derive(Debug, Clone)]
enum Affix {
    None,
    Attribute,
    Custom(String),
}

impl Affix {
    fn render(&self, attribute: &AttributeName, leading: bool) -> String {
        let text = match self {
            Affix::None => return String::new(),
            Affix::Attribute => attribute.as_str(),
            Affix::Custom(text) => text.as_str(),
        };
        if leading {
            format!("{text}_")
        } else {
            format!("_{text}")
        }
    }
}

impl<'a> EnumDeclaration<'a> {
    pub(crate) fn new(
        model: &'a Model,
        attribute: AttributeName,
        pairs: Vec<(String, Value)>,
    ) -> Self {
        Self {
            model,
            attribute,
            pairs,
            prefix: Affix::None,
            suffix: Affix::None,
            scopes: true,
            default: AttributeDefault::NotProvided,
        }
    }

    /// Prefix generated method names with the attribute name.
    pub fn prefix(mut self) -> Self {
        self.prefix = Affix::Attribute;
        self
    }

    /// Prefix generated method names with a custom string.
    pub fn prefix_with(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Affix::Custom(prefix.into());
        self
    }

    /// Suffix generated method names with the attribute name.
    pub fn suffix(mut self) -> Self {
        self.suffix = Affix::Attribute;
        self
    }

    /// Suffix generated method names with a custom string.
    pub fn suffix_with(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Affix::Custom(suffix.into());
        self
    }

    /// Skip scope generation (positive and negative).
    pub fn without_scopes(mut self) -> Self {
        self.scopes = false;
        self
    }

    /// Declared default, by label or by stored value.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = AttributeDefault::Value(value.into());
        self
    }

    /// Validates, collision-checks, and installs the enum attribute.
    pub fn declare(self) -> Result<(), RecastError> {
        let EnumDeclaration {
            model,
            attribute,
            pairs,
            prefix,
            suffix,
            scopes,
            default,
        } = self;
        let mapping = Arc::new(EnumMapping::from_pairs(&attribute, pairs)?);
        let prefix = prefix.render(&attribute, true);
        let suffix = suffix.render(&attribute, false);

        let mut instance: Vec<(String, GeneratedMethod)> = Vec::new();
        let mut class_level: Vec<(String, GeneratedMethod)> = Vec::new();

        instance.push((
            attribute.to_string(),
            GeneratedMethod::Reader {
                attribute: attribute.clone(),
            },
        ));
        instance.push((
            format!("{attribute}="),
            GeneratedMethod::Writer {
                attribute: attribute.clone(),
            },
        ));
        class_level.push((
            pluralize(attribute.as_str()),
            GeneratedMethod::LabelSet {
                attribute: attribute.clone(),
            },
        ));

        let mut value_method_names: Vec<String> = Vec::new();
        for (label, stored) in mapping.iter() {
            let method_name = format!("{prefix}{label}{suffix}");
            value_method_names.push(method_name.clone());
            push_label_methods(
                &mut instance,
                &mut class_level,
                &attribute,
                &method_name,
                stored,
                scopes,
            );

            let friendly = sanitize_label(label);
            if friendly != label {
                let alias = format!("{prefix}{friendly}{suffix}");
                if !value_method_names.contains(&alias) {
                    value_method_names.push(alias.clone());
                    push_label_methods(
                        &mut instance,
                        &mut class_level,
                        &attribute,
                        &alias,
                        stored,
                        scopes,
                    );
                }
            }
        }

        // Collision-check the full set before installing anything.
        for (name, method) in &instance {
            model.check_method_conflict(MethodNamespace::Instance, name, method)?;
        }
        for (name, method) in &class_level {
            model.check_method_conflict(MethodNamespace::ClassLevel, name, method)?;
        }

        {
            let mut table = model.methods.write();
            for (name, method) in instance {
                table.insert(MethodNamespace::Instance, name, method);
            }
            for (name, method) in class_level {
                table.insert(MethodNamespace::ClassLevel, name, method);
            }
        }
        model
            .enums
            .write()
            .insert(attribute.clone(), Arc::clone(&mapping));

        let enum_attribute = attribute.clone();
        let enum_mapping = Arc::clone(&mapping);
        model.declare_internal(
            attribute.clone(),
            None,
            Some(Arc::new(move |subtype| {
                Ok(TypeDescriptor::enumerated(
                    &enum_attribute,
                    Arc::clone(&enum_mapping),
                    subtype,
                ))
            })),
            default,
        )?;

        log::debug!(
            "model {}: enum `{}` declared with {} labels",
            model.name(),
            attribute,
            mapping.len()
        );
        Ok(())
    }
}

fn push_label_methods(
    instance: &mut Vec<(String, GeneratedMethod)>,
    class_level: &mut Vec<(String, GeneratedMethod)>,
    attribute: &AttributeName,
    method_name: &str,
    stored: &Value,
    scopes: bool,
) {
    instance.push((
        method_name.to_string(),
        GeneratedMethod::Predicate {
            attribute: attribute.clone(),
            stored: stored.clone(),
        },
    ));
    if scopes {
        class_level.push((
            method_name.to_string(),
            GeneratedMethod::Scope {
                attribute: attribute.clone(),
                stored: stored.clone(),
                negated: false,
            },
        ));
        class_level.push((
            format!("not_{method_name}"),
            GeneratedMethod::Scope {
                attribute: attribute.clone(),
                stored: stored.clone(),
                negated: true,
            },
        ));
    }
}

/// Pluralizes an attribute name for the class-level label-set accessor.
///
/// Intentionally small: `s`/`es`/`ies` cover the method-table keys this is
/// used for, and the conflict check catches any misfire.
pub(crate) fn pluralize(name: &str) -> String {
    if name.ends_with('s')
        || name.ends_with('x')
        || name.ends_with('z')
        || name.ends_with("ch")
        || name.ends_with("sh")
    {
        format!("{name}es")
    } else if name.len() >= 2 && name.ends_with('y') {
        let before = name.as_bytes()[name.len() - 2] as char;
        if matches!(before, 'a' | 'e' | 'i' | 'o' | 'u') {
            format!("{name}s")
        } else {
            format!("{}ies", &name[..name.len() - 1])
        }
    } else {
        format!("{name}s")
    }
}

/// Collapses runs of ASCII non-identifier characters into underscores.
/// Non-ASCII characters are preserved.
pub(crate) fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut replaced = false;
    for c in label.chars() {
        if c.is_ascii() && !(c.is_ascii_alphanumeric() || c == '_') {
            if !replaced {
                out.push('_');
                replaced = true;
            }
        } else {
            out.push(c);
            replaced = false;
        }
    }
    out
}
