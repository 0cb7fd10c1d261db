//! Table creation derived from record annotations.
//!
//! [`CreateTable`] walks an example value's fields once, collecting the
//! primary key, index key schemas and the attribute definitions they need.
//! The draft is then refined through chained calls and turned into an SDK
//! `CreateTableInput` by [`CreateTable::input`].
//!
//! ```ignore
//! record! {
//!     #[derive(Default)]
//!     pub struct UserAction {
//!         #[tag = r#"dynamo:"ID,hash" index:"Seq-ID-index,range""#]
//!         pub user_id: String,
//!         #[tag = r#"dynamo:"Time,range""#]
//!         pub time: DateTime<Utc>,
//!         #[tag = r#"dynamo:"Seq" localIndex:"ID-Seq-index,range" index:"Seq-ID-index,hash""#]
//!         pub seq: i64,
//!         #[tag = r#"dynamo:"UUID" index:"UUID-index,hash""#]
//!         pub uuid: String,
//!     }
//! }
//!
//! db.create_table("UserActions", &UserAction::default())
//!     .project("Seq-ID-index", ProjectionType::Include, &["UUID"])
//!     .wait()
//!     .await?;
//! ```

use aws_sdk_dynamodb::operation::create_table::CreateTableInput;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement,
    LocalSecondaryIndex, Projection, ProjectionType, ProvisionedThroughput, ScalarAttributeType,
    SseSpecification, SseType, StreamSpecification, StreamViewType, Tag,
};
use std::collections::BTreeMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::attribute::AttributeValue;
use crate::client::{Db, Transport};
use crate::errors::{Error, Result};
use crate::marshal::embedded_record;
use crate::retry::with_retry_until;
use crate::tag::{self, KeyRole};
use crate::value::{Kind, Marshal, Record, Repr};

/// A secondary index declared explicitly instead of through annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    name: String,
    local: bool,
    hash_key: (String, ScalarAttributeType),
    range_key: Option<(String, ScalarAttributeType)>,
    projection: Option<(ProjectionType, Vec<String>)>,
    throughput: Option<(i64, i64)>,
}

impl Index {
    /// A global secondary index with the given hash key.
    pub fn global(
        name: impl Into<String>,
        hash_key: impl Into<String>,
        hash_key_type: ScalarAttributeType,
    ) -> Self {
        Self {
            name: name.into(),
            local: false,
            hash_key: (hash_key.into(), hash_key_type),
            range_key: None,
            projection: None,
            throughput: None,
        }
    }

    /// A local secondary index. Its hash key must be the table's.
    pub fn local(
        name: impl Into<String>,
        hash_key: impl Into<String>,
        hash_key_type: ScalarAttributeType,
    ) -> Self {
        Self {
            local: true,
            ..Self::global(name, hash_key, hash_key_type)
        }
    }

    pub fn range(mut self, key: impl Into<String>, key_type: ScalarAttributeType) -> Self {
        self.range_key = Some((key.into(), key_type));
        self
    }

    /// Non-key attributes are only kept for `INCLUDE` projections.
    pub fn project(mut self, projection: ProjectionType, include: &[&str]) -> Self {
        let include = if projection == ProjectionType::Include {
            include.iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        };
        self.projection = Some((projection, include));
        self
    }

    /// Provisioned capacity of a global index. Ignored for local indexes.
    pub fn provision(mut self, read: i64, write: i64) -> Self {
        self.throughput = Some((read, write));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
struct KeyElement {
    name: String,
    role: KeyRole,
}

#[derive(Debug, Clone, Default)]
struct IndexDraft {
    key_schema: Vec<KeyElement>,
    projection: Option<(ProjectionType, Vec<String>)>,
    throughput: Option<(i64, i64)>,
}

/// A CreateTable request being assembled.
///
/// Configuration errors are sticky: the first one is kept and returned by
/// [`input`](Self::input), [`run`](Self::run) and [`wait`](Self::wait).
pub struct CreateTable<'a, T: Transport> {
    db: &'a Db<T>,
    table_name: String,
    attribs: Vec<(String, ScalarAttributeType)>,
    schema: Vec<KeyElement>,
    global_indices: BTreeMap<String, IndexDraft>,
    local_indices: BTreeMap<String, IndexDraft>,
    read_units: i64,
    write_units: i64,
    stream_view: Option<StreamViewType>,
    on_demand: bool,
    tags: Vec<(String, String)>,
    encryption: Option<SseSpecification>,
    err: Option<Error>,
}

impl<'a, T: Transport> CreateTable<'a, T> {
    /// Start a request for table `name`, inferring keys and indexes from
    /// `example`, which must be a record or an `Option` holding one.
    pub fn new(db: &'a Db<T>, name: impl Into<String>, example: &dyn Marshal) -> Self {
        let mut ct = Self {
            db,
            table_name: name.into(),
            attribs: Vec::new(),
            schema: Vec::new(),
            global_indices: BTreeMap::new(),
            local_indices: BTreeMap::new(),
            read_units: 1,
            write_units: 1,
            stream_view: None,
            on_demand: false,
            tags: Vec::new(),
            encryption: None,
            err: None,
        };
        if let Err(err) = ct.from_value(example) {
            ct.set_error(err);
        }
        ct
    }

    /// Use on-demand (pay per request) billing instead of provisioned
    /// capacity.
    pub fn on_demand(mut self, enabled: bool) -> Self {
        self.on_demand = enabled;
        self
    }

    /// Provisioned capacity of the table. Defaults to 1 each.
    pub fn provision(mut self, read_units: i64, write_units: i64) -> Self {
        self.read_units = read_units;
        self.write_units = write_units;
        self
    }

    /// Provisioned capacity of a global index. Local indexes share the
    /// table's capacity.
    pub fn provision_index(mut self, index: &str, read_units: i64, write_units: i64) -> Self {
        self.global_indices
            .entry(index.to_string())
            .or_default()
            .throughput = Some((read_units, write_units));
        self
    }

    /// Enable streams with the given view.
    pub fn stream(mut self, view: StreamViewType) -> Self {
        self.stream_view = Some(view);
        self
    }

    /// Set the projection of an index declared on the example or through
    /// [`index`](Self::index).
    ///
    /// # Arguments
    ///
    /// * `index` - Name of an existing global or local index
    /// * `projection` - Projection type
    /// * `include` - Non-key attributes for `INCLUDE`; duplicates are dropped
    pub fn project(mut self, index: &str, projection: ProjectionType, include: &[&str]) -> Self {
        let mut attribs: Vec<String> = Vec::new();
        if projection == ProjectionType::Include {
            for attr in include {
                if !attribs.iter().any(|a| a == attr) {
                    attribs.push(attr.to_string());
                }
            }
        }

        let projection = Some((projection, attribs));
        if let Some(draft) = self.global_indices.get_mut(index) {
            draft.projection = projection;
        } else if let Some(draft) = self.local_indices.get_mut(index) {
            draft.projection = projection;
        } else {
            self.set_error(Error::NoSuchIndex(index.to_string()));
        }
        self
    }

    /// Add an explicitly declared index.
    pub fn index(mut self, index: Index) -> Self {
        let (hash_name, hash_type) = index.hash_key;
        self.add(&hash_name, Some(hash_type));
        let mut key_schema = vec![KeyElement {
            name: hash_name,
            role: KeyRole::Hash,
        }];
        if let Some((range_name, range_type)) = index.range_key {
            self.add(&range_name, Some(range_type));
            key_schema.push(KeyElement {
                name: range_name,
                role: KeyRole::Range,
            });
        }

        let indices = if index.local {
            &mut self.local_indices
        } else {
            &mut self.global_indices
        };
        let draft = indices.entry(index.name).or_default();
        draft.key_schema = key_schema;
        if index.projection.is_some() {
            draft.projection = index.projection;
        }
        if !index.local && index.throughput.is_some() {
            draft.throughput = index.throughput;
        }
        self
    }

    /// Attach a metadata tag. Tagging the same key again replaces its value.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.tags.push((key, value)),
        }
        self
    }

    /// Server side encryption. An empty `key_id` leaves the KMS key unset.
    pub fn sse_encryption(mut self, enabled: bool, key_id: &str, sse_type: SseType) -> Self {
        let key_id = (!key_id.is_empty()).then(|| key_id.to_string());
        self.encryption = Some(
            SseSpecification::builder()
                .enabled(enabled)
                .set_kms_master_key_id(key_id)
                .sse_type(sse_type)
                .build(),
        );
        self
    }

    /// The first configuration error, if any.
    pub fn error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Finalize the request.
    pub fn input(self) -> Result<CreateTableInput> {
        if let Some(err) = self.err {
            return Err(err);
        }

        let mut schema = self.schema;
        sort_key_schema(&mut schema);
        let table_hash = match schema.first() {
            Some(first) if first.role == KeyRole::Hash => first.clone(),
            _ => return Err(Error::MissingHashKey(self.table_name)),
        };

        let mut request = CreateTableInput::builder()
            .table_name(&self.table_name)
            .set_attribute_definitions(Some(
                self.attribs
                    .iter()
                    .map(|(name, typ)| {
                        AttributeDefinition::builder()
                            .attribute_name(name)
                            .attribute_type(typ.clone())
                            .build()
                    })
                    .collect::<std::result::Result<_, _>>()?,
            ))
            .set_key_schema(Some(key_schema_elements(&schema)?));

        if self.on_demand {
            request = request.billing_mode(BillingMode::PayPerRequest);
        } else {
            request = request.provisioned_throughput(throughput(self.read_units, self.write_units)?);
        }

        if let Some(view) = self.stream_view {
            request = request.stream_specification(
                StreamSpecification::builder()
                    .stream_enabled(true)
                    .stream_view_type(view)
                    .build()?,
            );
        }

        for (name, draft) in self.local_indices {
            let mut key_schema = draft.key_schema;
            if key_schema.is_empty() {
                return Err(Error::EmptyIndex(name));
            }
            if key_schema.len() == 1 {
                key_schema.insert(0, table_hash.clone());
            }
            sort_key_schema(&mut key_schema);

            request = request.local_secondary_indexes(
                LocalSecondaryIndex::builder()
                    .index_name(name)
                    .set_key_schema(Some(key_schema_elements(&key_schema)?))
                    .projection(projection(draft.projection))
                    .build()?,
            );
        }

        for (name, draft) in self.global_indices {
            let mut key_schema = draft.key_schema;
            if key_schema.is_empty() {
                return Err(Error::EmptyIndex(name));
            }
            sort_key_schema(&mut key_schema);

            let provisioned = if self.on_demand {
                None
            } else {
                let (read, write) = draft.throughput.unwrap_or((1, 1));
                Some(throughput(read, write)?)
            };

            request = request.global_secondary_indexes(
                GlobalSecondaryIndex::builder()
                    .index_name(name)
                    .set_key_schema(Some(key_schema_elements(&key_schema)?))
                    .projection(projection(draft.projection))
                    .set_provisioned_throughput(provisioned)
                    .build()?,
            );
        }

        for (key, value) in self.tags {
            request = request.tags(Tag::builder().key(key).value(value).build()?);
        }

        request = request.set_sse_specification(self.encryption);

        let input = request.build()?;
        debug!(
            table = %self.table_name,
            attributes = input.attribute_definitions().len(),
            global_indexes = input.global_secondary_indexes().len(),
            local_indexes = input.local_secondary_indexes().len(),
            "assembled CreateTable request"
        );
        Ok(input)
    }

    /// Create the table, retrying throttled calls.
    pub async fn run(self) -> Result<()> {
        self.run_with_cancel(&CancellationToken::new()).await
    }

    pub async fn run_with_cancel(self, cancel: &CancellationToken) -> Result<()> {
        let deadline = self.db.retry_policy().deadline();
        self.run_until(deadline, cancel).await
    }

    async fn run_until(self, deadline: Option<Instant>, cancel: &CancellationToken) -> Result<()> {
        let db = self.db;
        let input = self.input()?;
        with_retry_until(db.retry_policy(), deadline, cancel, || {
            db.transport().create_table(input.clone())
        })
        .await
    }

    /// Create the table and wait until it is active.
    pub async fn wait(self) -> Result<()> {
        self.wait_with_cancel(&CancellationToken::new()).await
    }

    /// Creation and polling share one deadline.
    pub async fn wait_with_cancel(self, cancel: &CancellationToken) -> Result<()> {
        let db = self.db;
        let table_name = self.table_name.clone();
        let deadline = db.retry_policy().deadline();
        self.run_until(deadline, cancel).await?;
        db.wait_until_active_by(&table_name, deadline, cancel).await
    }

    fn set_error(&mut self, err: Error) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    fn from_value(&mut self, value: &dyn Marshal) -> Result<()> {
        match value.repr() {
            Repr::Struct(record) => {
                self.from_record(record);
                Ok(())
            }
            Repr::Pointer(Some(inner), _) => self.from_value(inner),
            _ => Err(Error::NotAStruct),
        }
    }

    fn from_record(&mut self, record: &dyn Record) {
        for field in record.fields() {
            if !field.spec.is_exported() {
                continue;
            }
            let descriptor = field.spec.descriptor();
            if descriptor.name == tag::SKIP {
                continue;
            }

            if field.spec.is_embedded() {
                if let Some(inner) = embedded_record(field.value) {
                    self.from_record(inner);
                }
            }

            let annotation = field.spec.annotation();
            let name = descriptor.name;

            if let Some(role) = descriptor.key {
                self.add(&name, type_of(field.value, &annotation));
                self.schema.push(KeyElement {
                    name: name.clone(),
                    role,
                });
            }

            for membership in descriptor.global_indexes {
                self.add(&name, type_of(field.value, &annotation));
                self.global_indices
                    .entry(membership.index)
                    .or_default()
                    .key_schema
                    .push(KeyElement {
                        name: name.clone(),
                        role: membership.role,
                    });
            }

            for membership in descriptor.local_indexes {
                self.add(&name, type_of(field.value, &annotation));
                self.local_indices
                    .entry(membership.index)
                    .or_default()
                    .key_schema
                    .push(KeyElement {
                        name: name.clone(),
                        role: membership.role,
                    });
            }
        }
    }

    fn add(&mut self, name: &str, typ: Option<ScalarAttributeType>) {
        let Some(typ) = typ else {
            self.set_error(Error::InvalidKeyType(name.to_string()));
            return;
        };

        match self.attribs.iter().find(|(existing, _)| existing == name) {
            Some((_, existing)) if *existing != typ => {
                let err = Error::ConflictingKeyType {
                    name: name.to_string(),
                    existing: existing.as_str().to_string(),
                    requested: typ.as_str().to_string(),
                };
                self.set_error(err);
            }
            Some(_) => {}
            None => self.attribs.push((name.to_string(), typ)),
        }
    }
}

/// Attribute type a key attribute would be declared with.
///
/// `None` means the value cannot serve as a key.
pub fn type_of(value: &dyn Marshal, annotation: &str) -> Option<ScalarAttributeType> {
    if tag::has_modifier(annotation, tag::UNIX_TIME) {
        return Some(ScalarAttributeType::N);
    }

    match value.repr() {
        Repr::Marshaler(m) => match m.marshal_dynamo().ok()? {
            AttributeValue::S(_) => Some(ScalarAttributeType::S),
            AttributeValue::N(_) => Some(ScalarAttributeType::N),
            AttributeValue::B(_) => Some(ScalarAttributeType::B),
            _ => None,
        },
        Repr::TextMarshaler(_) | Repr::Time(_) | Repr::String(_) => Some(ScalarAttributeType::S),
        Repr::Pointer(Some(inner), _) => type_of(inner, annotation),
        Repr::Pointer(None, kind) => type_of_kind(&kind),
        Repr::Int(_) | Repr::Uint(_) | Repr::F32(_) | Repr::F64(_) => Some(ScalarAttributeType::N),
        Repr::Bytes(_) => Some(ScalarAttributeType::B),
        _ => None,
    }
}

fn type_of_kind(kind: &Kind) -> Option<ScalarAttributeType> {
    match kind {
        Kind::String | Kind::TextMarshaler | Kind::Time => Some(ScalarAttributeType::S),
        Kind::Int | Kind::Uint | Kind::Float => Some(ScalarAttributeType::N),
        Kind::Bytes => Some(ScalarAttributeType::B),
        Kind::Pointer(inner) => type_of_kind(inner),
        _ => None,
    }
}

/// Hash keys first, keeping declaration order otherwise.
fn sort_key_schema(schema: &mut [KeyElement]) {
    schema.sort_by_key(|element| element.role != KeyRole::Hash);
}

fn key_schema_elements(schema: &[KeyElement]) -> Result<Vec<KeySchemaElement>> {
    schema
        .iter()
        .map(|element| {
            KeySchemaElement::builder()
                .attribute_name(&element.name)
                .key_type(element.role.key_type())
                .build()
                .map_err(Error::from)
        })
        .collect()
}

fn throughput(read: i64, write: i64) -> Result<ProvisionedThroughput> {
    Ok(ProvisionedThroughput::builder()
        .read_capacity_units(read)
        .write_capacity_units(write)
        .build()?)
}

fn projection(draft: Option<(ProjectionType, Vec<String>)>) -> Projection {
    match draft {
        Some((kind, include)) => Projection::builder()
            .projection_type(kind)
            .set_non_key_attributes((!include.is_empty()).then_some(include))
            .build(),
        None => Projection::builder()
            .projection_type(ProjectionType::All)
            .build(),
    }
}
