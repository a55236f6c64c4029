//! Models, declaration APIs, and the schema-load resolver.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use recast_commons::config::RecastConfig;
use recast_commons::errors::DeclarationError;
use recast_commons::models::{AttributeName, Column, ColumnType, ModelName, TableName, Value};
use recast_commons::serialization::{Codec, EncryptingCodec, JsonCodec};

use crate::enums::{EnumDeclaration, EnumMapping, GeneratedMethod, MethodNamespace, MethodTable};
use crate::error::RecastError;
use crate::record::ScopeCondition;
use crate::registry::pending::{
    AttributeDefault, DecorateFn, PendingAttribute, PendingAttributeTable, TypeProducer,
};
use crate::registry::resolved::ResolvedSchema;
use crate::schema::SchemaSource;
use crate::types::{TypeDescriptor, TypeLookup};

/// One model class: a named attribute set backed by a table.
///
/// Models are shared as `Arc<Model>` and use interior mutability throughout;
/// declaration and resolution are safe under concurrent access. A model
/// exclusively owns its pending table and resolved-schema cache; subclasses
/// read through to the parent's tables but never mutate them.
pub struct Model {
    pub(crate) name: ModelName,
    table_name: TableName,
    pub(crate) parent: Option<Arc<Model>>,

    schema_source: Arc<dyn SchemaSource>,
    types: Arc<TypeLookup>,
    config: Arc<RecastConfig>,
    filtered: Arc<RwLock<BTreeSet<String>>>,

    pending: RwLock<PendingAttributeTable>,
    pub(crate) enums: RwLock<BTreeMap<AttributeName, Arc<EnumMapping>>>,
    pub(crate) methods: RwLock<MethodTable>,

    resolved: RwLock<Option<Arc<ResolvedSchema>>>,
    resolve_lock: Mutex<()>,
    generation: AtomicU64,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table_name", &self.table_name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .field("pending", &self.pending.read().len())
            .field("resolved", &self.resolved.read().is_some())
            .finish()
    }
}

impl Model {
    #[allow(clippy::too_many_arguments)]
    fn new(
        name: ModelName,
        table_name: TableName,
        parent: Option<Arc<Model>>,
        schema_source: Arc<dyn SchemaSource>,
        types: Arc<TypeLookup>,
        config: Arc<RecastConfig>,
        filtered: Arc<RwLock<BTreeSet<String>>>,
    ) -> Self {
        Self {
            name,
            table_name,
            parent,
            schema_source,
            types,
            config,
            filtered,
            pending: RwLock::new(PendingAttributeTable::new()),
            enums: RwLock::new(BTreeMap::new()),
            methods: RwLock::new(MethodTable::default()),
            resolved: RwLock::new(None),
            resolve_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &ModelName {
        &self.name
    }

    pub fn table_name(&self) -> &TableName {
        &self.table_name
    }

    pub fn parent(&self) -> Option<&Arc<Model>> {
        self.parent.as_ref()
    }

    pub(crate) fn filtered(&self) -> &Arc<RwLock<BTreeSet<String>>> {
        &self.filtered
    }

    // ===== Declaration API =====

    /// Declares an attribute with a symbolic type, replacing any decorating
    /// chain previously registered for `name`.
    pub fn attribute(
        &self,
        name: impl Into<AttributeName>,
        type_name: &str,
    ) -> Result<(), RecastError> {
        self.declare_internal(
            name.into(),
            Some(TypeProducer::Named(type_name.to_string())),
            None,
            AttributeDefault::NotProvided,
        )
    }

    /// Declares an attribute with an optional symbolic type and an explicit
    /// default. `type_name: None` keeps the existing (or inherited) type.
    pub fn attribute_with_default(
        &self,
        name: impl Into<AttributeName>,
        type_name: Option<&str>,
        default: impl Into<Value>,
    ) -> Result<(), RecastError> {
        self.declare_internal(
            name.into(),
            type_name.map(|n| TypeProducer::Named(n.to_string())),
            None,
            AttributeDefault::Value(default.into()),
        )
    }

    /// Overrides only the default, keeping the resolved type - including an
    /// ancestor's resolved type when this model never declared `name`.
    pub fn attribute_default(
        &self,
        name: impl Into<AttributeName>,
        default: impl Into<Value>,
    ) -> Result<(), RecastError> {
        self.attribute_with_default(name, None, default)
    }

    /// Declares an attribute with an explicit descriptor, used as-is.
    pub fn attribute_descriptor(
        &self,
        name: impl Into<AttributeName>,
        descriptor: TypeDescriptor,
    ) -> Result<(), RecastError> {
        self.declare_internal(
            name.into(),
            Some(TypeProducer::Fixed(descriptor)),
            None,
            AttributeDefault::NotProvided,
        )
    }

    /// Declares an attribute through a decorator function receiving the
    /// resolved prior type (or the raw column type for a fresh chain).
    pub fn attribute_decorated(
        &self,
        name: impl Into<AttributeName>,
        decorate: impl Fn(TypeDescriptor) -> Result<TypeDescriptor, RecastError>
            + Send
            + Sync
            + 'static,
    ) -> Result<(), RecastError> {
        self.declare_internal(
            name.into(),
            None,
            Some(Arc::new(decorate)),
            AttributeDefault::NotProvided,
        )
    }

    /// Serializes `name` through `codec`, wrapping whatever type the
    /// attribute otherwise resolves to. Re-serializing replaces the codec
    /// rather than stacking a second one.
    ///
    /// A base type that cannot round-trip through a codec is rejected here
    /// when static information allows, and at resolution otherwise.
    pub fn serialize_with(
        &self,
        name: impl Into<AttributeName>,
        codec: Arc<dyn Codec>,
        default: AttributeDefault,
    ) -> Result<(), RecastError> {
        let name = name.into();
        if let Some(base) = self.static_base_type(&name) {
            crate::types::descriptor::ensure_serializable(&name, base)?;
        }
        let attribute = name.clone();
        let decorate: DecorateFn = Arc::new(move |subtype| {
            Ok(TypeDescriptor::serialized(
                &attribute,
                subtype,
                Arc::clone(&codec),
            )?)
        });
        self.declare_internal(name, None, Some(decorate), default)
    }

    /// Serializes `name` as JSON text.
    pub fn serialize_json(&self, name: impl Into<AttributeName>) -> Result<(), RecastError> {
        self.serialize_with(name, Arc::new(JsonCodec::new()), AttributeDefault::NotProvided)
    }

    /// Transparently encrypts `name` using the configured primary key.
    pub fn encrypts(&self, name: impl Into<AttributeName>) -> Result<(), RecastError> {
        let name = name.into();
        let encryption = &self.config.encryption;
        let secret = encryption
            .primary_key
            .as_deref()
            .ok_or(DeclarationError::MissingEncryptionKey)?;
        let salt = encryption.key_derivation_salt.as_deref().unwrap_or_default();
        let codec = Arc::new(EncryptingCodec::new(secret, salt));
        self.register_filtered(&name);
        self.serialize_with(name, codec, AttributeDefault::NotProvided)
    }

    /// Encrypts `name` deterministically, so equal plaintexts produce equal
    /// ciphertexts and equality queries keep working.
    pub fn encrypts_deterministic(
        &self,
        name: impl Into<AttributeName>,
    ) -> Result<(), RecastError> {
        let name = name.into();
        let encryption = &self.config.encryption;
        let secret = encryption
            .deterministic_key
            .as_deref()
            .ok_or(DeclarationError::MissingEncryptionKey)?;
        let salt = encryption.key_derivation_salt.as_deref().unwrap_or_default();
        let codec = Arc::new(EncryptingCodec::deterministic(secret, salt));
        self.register_filtered(&name);
        self.serialize_with(name, codec, AttributeDefault::NotProvided)
    }

    fn register_filtered(&self, name: &AttributeName) {
        if self.config.encryption.add_to_filter_parameters {
            self.filtered.write().insert(name.to_string());
        }
    }

    /// Starts an enum attribute declaration.
    ///
    /// ```ignore
    /// model
    ///     .enum_attribute("status", vec![("draft", 0), ("published", 1)])
    ///     .declare()?;
    /// ```
    pub fn enum_attribute(
        &self,
        name: impl Into<AttributeName>,
        pairs: Vec<(impl Into<String>, impl Into<Value>)>,
    ) -> EnumDeclaration<'_> {
        let pairs = pairs
            .into_iter()
            .map(|(label, value)| (label.into(), value.into()))
            .collect();
        EnumDeclaration::new(self, name.into(), pairs)
    }

    /// Core declaration path shared by every public entry point.
    ///
    /// With an explicit `producer` the entry starts a fresh chain. Without
    /// one, the nearest prior entry (own or inherited) supplies the producer
    /// - wrapped by `decorate` when given - and, when no explicit default
    /// was passed, its default. Producer and default merge independently.
    pub(crate) fn declare_internal(
        &self,
        name: AttributeName,
        producer: Option<TypeProducer>,
        decorate: Option<DecorateFn>,
        mut default: AttributeDefault,
    ) -> Result<(), RecastError> {
        let entry = match producer {
            Some(producer) => PendingAttribute { producer, default },
            None => match self.pending_entry(&name) {
                Some(prev) => {
                    if !default.is_provided() {
                        default = prev.default.clone();
                    }
                    let producer = match decorate {
                        Some(decorate) => TypeProducer::Decorator {
                            inner: Some(Box::new(prev.producer.clone())),
                            decorate,
                        },
                        None => prev.producer.clone(),
                    };
                    PendingAttribute { producer, default }
                }
                None => {
                    let producer = match decorate {
                        Some(decorate) => TypeProducer::Decorator {
                            inner: None,
                            decorate,
                        },
                        None => TypeProducer::passthrough(),
                    };
                    PendingAttribute { producer, default }
                }
            },
        };

        {
            // Accessor entries; an unrelated occupant keeps its slot.
            let reader = GeneratedMethod::Reader {
                attribute: name.clone(),
            };
            let writer = GeneratedMethod::Writer {
                attribute: name.clone(),
            };
            let writer_name = format!("{name}=");
            let mut table = self.methods.write();
            if table
                .check(MethodNamespace::Instance, name.as_str(), &reader)
                .is_ok()
            {
                table.insert(MethodNamespace::Instance, name.to_string(), reader);
            }
            if table
                .check(MethodNamespace::Instance, &writer_name, &writer)
                .is_ok()
            {
                table.insert(MethodNamespace::Instance, writer_name, writer);
            }
        }

        self.pending.write().insert(name.clone(), entry);
        self.invalidate();
        log::debug!("model {}: attribute `{}` declared", self.name, name);
        Ok(())
    }

    /// Nearest pending entry for `name`: own table first, then ancestors.
    pub(crate) fn pending_entry(&self, name: &AttributeName) -> Option<PendingAttribute> {
        if let Some(entry) = self.pending.read().get(name) {
            return Some(entry.clone());
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.pending_entry(name))
    }

    /// Inheritance-flattened pending table, nearest entry winning per name.
    fn flattened_pending(&self) -> BTreeMap<AttributeName, PendingAttribute> {
        let mut chain: Vec<&Model> = Vec::new();
        let mut node = Some(self);
        while let Some(model) = node {
            chain.push(model);
            node = model.parent.as_deref();
        }

        let mut merged = BTreeMap::new();
        for model in chain.into_iter().rev() {
            for (name, entry) in model.pending.read().iter() {
                merged.insert(name.clone(), entry.clone());
            }
        }
        merged
    }

    // ===== Resolution =====

    /// Returns the resolved schema, building it on first access.
    ///
    /// Fast path is a read-locked cache hit. The slow path serializes
    /// first-time resolvers through a dedicated mutex with a double-check,
    /// so the schema-source lookup runs at most once per (model, generation)
    /// under contention; concurrent callers block until the winner installs
    /// a complete schema and then observe exactly that schema. A lookup
    /// failure installs nothing, propagates to every caller that attempted
    /// resolution, and leaves the model safe to retry.
    pub fn resolved_schema(&self) -> Result<Arc<ResolvedSchema>, RecastError> {
        loop {
            if let Some(schema) = self.resolved.read().as_ref() {
                return Ok(Arc::clone(schema));
            }

            let _flight = self.resolve_lock.lock();
            if let Some(schema) = self.resolved.read().as_ref() {
                return Ok(Arc::clone(schema));
            }

            let generation = self.generation.load(Ordering::SeqCst);
            let schema = Arc::new(self.build_resolved(generation)?);

            // A declaration may have raced the build; install only if the
            // pending state the schema was built from is still current.
            if self.generation.load(Ordering::SeqCst) == generation {
                *self.resolved.write() = Some(Arc::clone(&schema));
                log::debug!(
                    "model {}: resolved {} attributes (generation {})",
                    self.name,
                    schema.len(),
                    generation
                );
                return Ok(schema);
            }
        }
    }

    /// Resolved descriptor for one attribute.
    pub fn type_for_attribute(
        &self,
        name: impl Into<AttributeName>,
    ) -> Result<Arc<TypeDescriptor>, RecastError> {
        Ok(self.resolved_schema()?.type_of(&name.into()))
    }

    /// Drops this model's resolved schema so the next access re-consults the
    /// schema source. Subclass caches are untouched.
    pub fn reload_schema(&self) {
        self.invalidate();
        log::debug!("model {}: schema reload requested", self.name);
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.resolved.write() = None;
    }

    fn build_resolved(&self, generation: u64) -> Result<ResolvedSchema, RecastError> {
        log::debug!(
            "model {}: resolving schema from table `{}`",
            self.name,
            self.table_name
        );
        let columns = self.schema_source.columns_for(&self.table_name)?;
        let by_name: BTreeMap<AttributeName, &Column> =
            columns.iter().map(|c| (c.name.clone(), c)).collect();

        let mut attributes: BTreeMap<AttributeName, Arc<TypeDescriptor>> = BTreeMap::new();

        for (name, entry) in self.flattened_pending() {
            let column = by_name.get(&name).copied();
            let input = match column {
                Some(column) => TypeDescriptor::from_column(column),
                None => TypeDescriptor::base(ColumnType::Untyped),
            };
            let column_default = column.and_then(|c| c.default_literal.clone());

            let resolved = self.apply_producer(&entry.producer, input)?;
            let resolved = match entry.default {
                AttributeDefault::Value(ref value) => {
                    resolved.replacing_default(Some(value.clone()))
                }
                AttributeDefault::NotProvided => {
                    if resolved.default_value().is_some() {
                        resolved
                    } else {
                        resolved.replacing_default(column_default)
                    }
                }
            };
            attributes.insert(name, Arc::new(resolved));
        }

        // Columns with no declaration pass straight through.
        for column in &columns {
            attributes
                .entry(column.name.clone())
                .or_insert_with(|| Arc::new(TypeDescriptor::from_column(column)));
        }

        Ok(ResolvedSchema::new(attributes, generation))
    }

    /// Applies a producer chain inner-to-outer against the column's input
    /// descriptor.
    fn apply_producer(
        &self,
        producer: &TypeProducer,
        input: TypeDescriptor,
    ) -> Result<TypeDescriptor, RecastError> {
        match producer {
            TypeProducer::Named(name) => Ok(self.types.lookup(name, input.base_type())?),
            TypeProducer::Fixed(descriptor) => Ok(descriptor.clone()),
            TypeProducer::Decorator { inner, decorate } => {
                let subtype = match inner {
                    Some(inner) => self.apply_producer(inner, input)?,
                    None => input,
                };
                decorate(subtype)
            }
        }
    }

    /// Base type for `name` derivable without running producers: a prior
    /// symbolic or fixed declaration, else the raw column type.
    fn static_base_type(&self, name: &AttributeName) -> Option<ColumnType> {
        match self.pending_entry(name).map(|entry| entry.producer) {
            Some(TypeProducer::Named(type_name)) => self
                .types
                .lookup(&type_name, ColumnType::Untyped)
                .ok()
                .map(|descriptor| descriptor.base_type()),
            Some(TypeProducer::Fixed(descriptor)) => Some(descriptor.base_type()),
            Some(TypeProducer::Decorator { .. }) => None,
            None => self
                .schema_source
                .columns_for(&self.table_name)
                .ok()
                .and_then(|columns| columns.into_iter().find(|c| c.name == *name))
                .map(|column| column.native_type),
        }
    }

    // ===== Generated-method dispatch =====

    /// Nearest method-table entry for `name`, walking the ancestor chain.
    pub fn find_method(&self, namespace: MethodNamespace, name: &str) -> Option<GeneratedMethod> {
        if let Some(method) = self.methods.read().get(namespace, name) {
            return Some(method.clone());
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.find_method(namespace, name))
    }

    pub(crate) fn check_method_conflict(
        &self,
        namespace: MethodNamespace,
        name: &str,
        method: &GeneratedMethod,
    ) -> Result<(), DeclarationError> {
        self.methods.read().check(namespace, name, method)?;
        match &self.parent {
            Some(parent) => parent.check_method_conflict(namespace, name, method),
            None => Ok(()),
        }
    }

    /// Scope condition registered under `name`, for query building.
    pub fn scope(&self, name: &str) -> Result<ScopeCondition, RecastError> {
        match self.find_method(MethodNamespace::ClassLevel, name) {
            Some(GeneratedMethod::Scope {
                attribute,
                stored,
                negated,
            }) => Ok(ScopeCondition::new(attribute, stored, negated)),
            _ => Err(RecastError::UnknownMethod {
                model: self.name.to_string(),
                method: name.to_string(),
            }),
        }
    }

    /// Label set registered under the pluralized accessor `name`.
    pub fn labels(&self, name: &str) -> Result<Arc<EnumMapping>, RecastError> {
        match self.find_method(MethodNamespace::ClassLevel, name) {
            Some(GeneratedMethod::LabelSet { attribute }) => {
                self.enum_mapping(&attribute)
                    .ok_or_else(|| RecastError::UnknownMethod {
                        model: self.name.to_string(),
                        method: name.to_string(),
                    })
            }
            _ => Err(RecastError::UnknownMethod {
                model: self.name.to_string(),
                method: name.to_string(),
            }),
        }
    }

    /// Enum mapping declared for `attribute`, own or inherited.
    pub fn enum_mapping(&self, attribute: &AttributeName) -> Option<Arc<EnumMapping>> {
        if let Some(mapping) = self.enums.read().get(attribute) {
            return Some(Arc::clone(mapping));
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.enum_mapping(attribute))
    }
}

/// Process-level front door: defines models and holds what they share.
///
/// The registry owns the schema source, the symbolic type lookup, the
/// configuration, and the filtered-attribute list; models hold `Arc`s into
/// all of them. Lookup of defined models is lock-free via `DashMap`.
pub struct AttributeRegistry {
    schema_source: Arc<dyn SchemaSource>,
    types: Arc<TypeLookup>,
    config: Arc<RecastConfig>,
    models: DashMap<ModelName, Arc<Model>>,
    filtered: Arc<RwLock<BTreeSet<String>>>,
}

impl std::fmt::Debug for AttributeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeRegistry")
            .field("models", &self.models.len())
            .field("filtered", &self.filtered.read().len())
            .finish()
    }
}

impl AttributeRegistry {
    pub fn new(schema_source: Arc<dyn SchemaSource>) -> Self {
        Self::with_config(schema_source, RecastConfig::default())
    }

    pub fn with_config(schema_source: Arc<dyn SchemaSource>, config: RecastConfig) -> Self {
        Self {
            schema_source,
            types: Arc::new(TypeLookup::new()),
            config: Arc::new(config),
            models: DashMap::new(),
            filtered: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }

    /// Defines a root model backed by `table`.
    pub fn define_model(
        &self,
        name: impl Into<ModelName>,
        table: impl Into<TableName>,
    ) -> Result<Arc<Model>, DeclarationError> {
        let name = name.into();
        if self.models.contains_key(&name) {
            return Err(DeclarationError::ModelAlreadyDefined {
                model: name.to_string(),
            });
        }
        let model = Arc::new(Model::new(
            name.clone(),
            table.into(),
            None,
            Arc::clone(&self.schema_source),
            Arc::clone(&self.types),
            Arc::clone(&self.config),
            Arc::clone(&self.filtered),
        ));
        self.models.insert(name, Arc::clone(&model));
        log::debug!("registry: model `{}` defined", model.name);
        Ok(model)
    }

    /// Defines a subclass of `parent`: same table, empty own pending table,
    /// read-through access to the parent's declarations.
    pub fn define_subclass(
        &self,
        name: impl Into<ModelName>,
        parent: &Arc<Model>,
    ) -> Result<Arc<Model>, DeclarationError> {
        let name = name.into();
        if self.models.contains_key(&name) {
            return Err(DeclarationError::ModelAlreadyDefined {
                model: name.to_string(),
            });
        }
        let model = Arc::new(Model::new(
            name.clone(),
            parent.table_name.clone(),
            Some(Arc::clone(parent)),
            Arc::clone(&self.schema_source),
            Arc::clone(&self.types),
            Arc::clone(&self.config),
            Arc::clone(&self.filtered),
        ));
        self.models.insert(name, Arc::clone(&model));
        log::debug!(
            "registry: model `{}` defined as subclass of `{}`",
            model.name,
            parent.name
        );
        Ok(model)
    }

    /// Looks up a previously defined model.
    pub fn model(&self, name: &str) -> Option<Arc<Model>> {
        self.models
            .get(&ModelName::new(name))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Registers a custom symbolic type usable in `attribute` declarations.
    pub fn register_type(
        &self,
        name: impl Into<String>,
        factory: impl Fn(ColumnType) -> TypeDescriptor + Send + Sync + 'static,
    ) {
        self.types.register(name, factory);
    }

    /// Attribute names whose values should be filtered from logs and dumps.
    pub fn filter_parameters(&self) -> Vec<String> {
        self.filtered.read().iter().cloned().collect()
    }

    pub fn config(&self) -> &Arc<RecastConfig> {
        &self.config
    }

    pub fn schema_source(&self) -> &Arc<dyn SchemaSource> {
        &self.schema_source
    }
}
