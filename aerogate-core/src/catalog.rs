//! In-process reference catalog.
//!
//! `MemoryCatalog` implements [`CapabilityRegistry`] over a nested map
//! (namespace → set → key → bins) so the gateway can run end to end without a
//! backing store. Records without a set live in the unnamed set (`""`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::capability::{
    CapabilityDescriptor, CapabilityError, CapabilityRegistry, ResourceBody, ResourceDescriptor,
};

const RESOURCE_SCHEME: &str = "store://";
const JSON_MIME: &str = "application/json";

type Bins = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
struct IndexDef {
    set: String,
    bin: String,
    index_type: String,
}

#[derive(Debug, Default)]
struct Namespace {
    sets: BTreeMap<String, BTreeMap<String, Bins>>,
    indexes: BTreeMap<String, IndexDef>,
}

#[derive(Debug)]
pub struct MemoryCatalog {
    namespaces: RwLock<BTreeMap<String, Namespace>>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new(["test"])
    }
}

impl MemoryCatalog {
    /// A catalog with the given (empty) namespaces.
    pub fn new<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let namespaces = namespaces
            .into_iter()
            .map(|ns| (ns.into(), Namespace::default()))
            .collect();
        Self {
            namespaces: RwLock::new(namespaces),
        }
    }

    fn with_namespace<T>(
        &self,
        namespace: &str,
        f: impl FnOnce(&Namespace) -> Result<T, CapabilityError>,
    ) -> Result<T, CapabilityError> {
        let namespaces = self.namespaces.read();
        let ns = namespaces
            .get(namespace)
            .ok_or_else(|| CapabilityError::NotFound(format!("namespace '{namespace}'")))?;
        f(ns)
    }

    fn with_namespace_mut<T>(
        &self,
        namespace: &str,
        f: impl FnOnce(&mut Namespace) -> Result<T, CapabilityError>,
    ) -> Result<T, CapabilityError> {
        let mut namespaces = self.namespaces.write();
        let ns = namespaces
            .get_mut(namespace)
            .ok_or_else(|| CapabilityError::NotFound(format!("namespace '{namespace}'")))?;
        f(ns)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read tools
    // ─────────────────────────────────────────────────────────────────────────

    fn list_namespaces(&self) -> Value {
        let namespaces = self.namespaces.read();
        let names: Vec<&str> = namespaces.keys().map(String::as_str).collect();
        json!({ "namespaces": names })
    }

    fn list_sets(&self, args: NamespaceArgs) -> Result<Value, CapabilityError> {
        self.with_namespace(&args.namespace, |ns| Ok(sets_summary(&args.namespace, ns)))
    }

    fn get_record(&self, args: RecordArgs) -> Result<Value, CapabilityError> {
        let key = args.key.to_key();
        self.with_namespace(&args.namespace, |ns| {
            let bins = ns
                .sets
                .get(&args.set_name)
                .and_then(|set| set.get(&key))
                .ok_or_else(|| CapabilityError::NotFound(format!("record '{key}'")))?;
            Ok(json!({
                "namespace": args.namespace,
                "set_name": args.set_name,
                "key": key,
                "bins": project(bins, args.bins.as_deref()),
            }))
        })
    }

    fn batch_get(&self, args: BatchGetArgs) -> Result<Value, CapabilityError> {
        self.with_namespace(&args.namespace, |ns| {
            let records: Vec<Value> = args
                .keys
                .iter()
                .map(|entry| {
                    let (set_name, key) = entry.resolve(&args.set_name);
                    match ns.sets.get(set_name).and_then(|set| set.get(&key)) {
                        Some(bins) => json!({"key": key, "set_name": set_name, "found": true, "bins": bins}),
                        None => json!({"key": key, "set_name": set_name, "found": false}),
                    }
                })
                .collect();
            Ok(json!({ "records": records }))
        })
    }

    fn list_indexes(&self, args: NamespaceArgs) -> Result<Value, CapabilityError> {
        self.with_namespace(&args.namespace, |ns| Ok(indexes_summary(&args.namespace, ns)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write tools
    // ─────────────────────────────────────────────────────────────────────────

    fn put_record(&self, args: PutArgs) -> Result<Value, CapabilityError> {
        if args.bins.is_empty() {
            return Err(CapabilityError::InvalidArguments(
                "bins cannot be empty".to_string(),
            ));
        }
        let key = args.key.to_key();
        self.with_namespace_mut(&args.namespace, |ns| {
            let record = ns
                .sets
                .entry(args.set_name.clone())
                .or_default()
                .entry(key.clone())
                .or_default();
            let written = args.bins.len();
            record.extend(args.bins);
            Ok(json!({"key": key, "set_name": args.set_name, "bins_written": written}))
        })
    }

    fn delete_record(&self, args: RecordArgs) -> Result<Value, CapabilityError> {
        let key = args.key.to_key();
        self.with_namespace_mut(&args.namespace, |ns| {
            let existed = ns
                .sets
                .get_mut(&args.set_name)
                .and_then(|set| set.remove(&key))
                .is_some();
            Ok(json!({"key": key, "deleted": existed}))
        })
    }

    fn batch_write(&self, args: BatchWriteArgs) -> Result<Value, CapabilityError> {
        self.with_namespace_mut(&args.namespace, |ns| {
            let mut written = 0usize;
            let mut deleted = 0usize;
            for record in args.records {
                let set_name = record.set_name.unwrap_or_else(|| args.set_name.clone());
                let key = record.key.to_key();
                match record.operation {
                    WriteOp::Put => {
                        ns.sets
                            .entry(set_name)
                            .or_default()
                            .entry(key)
                            .or_default()
                            .extend(record.bins);
                        written += 1;
                    }
                    WriteOp::Delete => {
                        if ns
                            .sets
                            .get_mut(&set_name)
                            .and_then(|set| set.remove(&key))
                            .is_some()
                        {
                            deleted += 1;
                        }
                    }
                }
            }
            Ok(json!({"written": written, "deleted": deleted}))
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admin tools
    // ─────────────────────────────────────────────────────────────────────────

    fn truncate_set(&self, args: TruncateArgs) -> Result<Value, CapabilityError> {
        if !(args.confirm && args.confirm_destructive) {
            return Err(CapabilityError::InvalidArguments(
                "truncate_set requires confirm and confirm_destructive to be true".to_string(),
            ));
        }
        self.with_namespace_mut(&args.namespace, |ns| {
            let removed = ns
                .sets
                .get_mut(&args.set_name)
                .map(|set| {
                    let n = set.len();
                    set.clear();
                    n
                })
                .unwrap_or(0);
            Ok(json!({"set_name": args.set_name, "records_removed": removed}))
        })
    }

    fn create_index(&self, args: CreateIndexArgs) -> Result<Value, CapabilityError> {
        self.with_namespace_mut(&args.namespace, |ns| {
            if ns.indexes.contains_key(&args.index_name) {
                return Err(CapabilityError::Operation(format!(
                    "index '{}' already exists",
                    args.index_name
                )));
            }
            ns.indexes.insert(
                args.index_name.clone(),
                IndexDef {
                    set: args.set_name,
                    bin: args.bin_name,
                    index_type: args.index_type.to_ascii_uppercase(),
                },
            );
            Ok(json!({"index_name": args.index_name, "created": true}))
        })
    }

    fn drop_index(&self, args: DropIndexArgs) -> Result<Value, CapabilityError> {
        if !args.confirm {
            return Err(CapabilityError::InvalidArguments(
                "drop_index requires confirm to be true".to_string(),
            ));
        }
        self.with_namespace_mut(&args.namespace, |ns| {
            ns.indexes
                .remove(&args.index_name)
                .ok_or_else(|| CapabilityError::NotFound(format!("index '{}'", args.index_name)))?;
            Ok(json!({"index_name": args.index_name, "dropped": true}))
        })
    }
}

#[async_trait]
impl CapabilityRegistry for MemoryCatalog {
    fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        tool_descriptors()
    }

    async fn invoke(&self, name: &str, arguments: &Value) -> Result<Value, CapabilityError> {
        match name {
            "list_namespaces" => Ok(self.list_namespaces()),
            "list_sets" => self.list_sets(parse_args(arguments)?),
            "get_record" => self.get_record(parse_args(arguments)?),
            "batch_get" => self.batch_get(parse_args(arguments)?),
            "list_indexes" => self.list_indexes(parse_args(arguments)?),
            "put_record" => self.put_record(parse_args(arguments)?),
            "delete_record" => self.delete_record(parse_args(arguments)?),
            "batch_write" => self.batch_write(parse_args(arguments)?),
            "truncate_set" => self.truncate_set(parse_args(arguments)?),
            "create_index" => self.create_index(parse_args(arguments)?),
            "drop_index" => self.drop_index(parse_args(arguments)?),
            other => Err(CapabilityError::UnknownTool(other.to_string())),
        }
    }

    fn resources(&self) -> Vec<ResourceDescriptor> {
        let mut resources = vec![ResourceDescriptor {
            uri: format!("{RESOURCE_SCHEME}cluster/info"),
            name: "Cluster Info".to_string(),
            description: Some("Namespaces and record counts".to_string()),
            mime_type: JSON_MIME.to_string(),
        }];
        for ns in self.namespaces.read().keys() {
            resources.push(ResourceDescriptor {
                uri: format!("{RESOURCE_SCHEME}ns/{ns}/sets"),
                name: format!("Sets in {ns}"),
                description: None,
                mime_type: JSON_MIME.to_string(),
            });
            resources.push(ResourceDescriptor {
                uri: format!("{RESOURCE_SCHEME}ns/{ns}/indexes"),
                name: format!("Indexes in {ns}"),
                description: None,
                mime_type: JSON_MIME.to_string(),
            });
        }
        resources
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceBody, CapabilityError> {
        let unknown = || CapabilityError::UnknownResource(uri.to_string());
        let path = uri.strip_prefix(RESOURCE_SCHEME).ok_or_else(unknown)?;

        let value = match path.split('/').collect::<Vec<_>>().as_slice() {
            ["cluster", "info"] => {
                let namespaces = self.namespaces.read();
                let summary: Vec<Value> = namespaces
                    .iter()
                    .map(|(name, ns)| {
                        let records: usize = ns.sets.values().map(BTreeMap::len).sum();
                        json!({"name": name, "records": records, "indexes": ns.indexes.len()})
                    })
                    .collect();
                json!({"namespaces": summary})
            }
            ["ns", namespace, "sets"] => {
                self.with_namespace(namespace, |ns| Ok(sets_summary(namespace, ns)))?
            }
            ["ns", namespace, "indexes"] => {
                self.with_namespace(namespace, |ns| Ok(indexes_summary(namespace, ns)))?
            }
            _ => return Err(unknown()),
        };

        Ok(ResourceBody {
            mime_type: JSON_MIME.to_string(),
            text: serde_json::to_string_pretty(&value)
                .map_err(|e| CapabilityError::Operation(e.to_string()))?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

fn parse_args<T: DeserializeOwned>(arguments: &Value) -> Result<T, CapabilityError> {
    T::deserialize(arguments).map_err(|e| CapabilityError::InvalidArguments(e.to_string()))
}

/// A primary key given as a string or an integer.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum KeyValue {
    Int(i64),
    Str(String),
}

impl KeyValue {
    fn to_key(&self) -> String {
        match self {
            KeyValue::Int(n) => n.to_string(),
            KeyValue::Str(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NamespaceArgs {
    namespace: String,
}

#[derive(Debug, Deserialize)]
struct RecordArgs {
    namespace: String,
    #[serde(default, alias = "set")]
    set_name: String,
    key: KeyValue,
    #[serde(default)]
    bins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchKey {
    Bare(KeyValue),
    Qualified {
        key: KeyValue,
        #[serde(default, alias = "set")]
        set_name: Option<String>,
    },
}

impl BatchKey {
    fn resolve<'a>(&'a self, default_set: &'a str) -> (&'a str, String) {
        match self {
            BatchKey::Bare(key) => (default_set, key.to_key()),
            BatchKey::Qualified { key, set_name } => {
                (set_name.as_deref().unwrap_or(default_set), key.to_key())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchGetArgs {
    namespace: String,
    #[serde(default, alias = "set")]
    set_name: String,
    keys: Vec<BatchKey>,
}

#[derive(Debug, Deserialize)]
struct PutArgs {
    namespace: String,
    #[serde(default, alias = "set")]
    set_name: String,
    key: KeyValue,
    bins: Bins,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WriteOp {
    #[default]
    Put,
    Delete,
}

#[derive(Debug, Deserialize)]
struct BatchRecord {
    key: KeyValue,
    #[serde(default, alias = "set")]
    set_name: Option<String>,
    #[serde(default)]
    bins: Bins,
    #[serde(default)]
    operation: WriteOp,
}

#[derive(Debug, Deserialize)]
struct BatchWriteArgs {
    namespace: String,
    #[serde(default, alias = "set")]
    set_name: String,
    records: Vec<BatchRecord>,
}

#[derive(Debug, Deserialize)]
struct TruncateArgs {
    namespace: String,
    #[serde(alias = "set")]
    set_name: String,
    #[serde(default)]
    confirm: bool,
    #[serde(default)]
    confirm_destructive: bool,
}

#[derive(Debug, Deserialize)]
struct CreateIndexArgs {
    namespace: String,
    #[serde(default, alias = "set")]
    set_name: String,
    index_name: String,
    bin_name: String,
    index_type: String,
}

#[derive(Debug, Deserialize)]
struct DropIndexArgs {
    namespace: String,
    index_name: String,
    #[serde(default)]
    confirm: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn project(bins: &Bins, wanted: Option<&[String]>) -> Bins {
    match wanted {
        None => bins.clone(),
        Some(names) => bins
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

fn sets_summary(namespace: &str, ns: &Namespace) -> Value {
    let sets: Vec<Value> = ns
        .sets
        .iter()
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, records)| json!({"name": name, "objects": records.len()}))
        .collect();
    json!({"namespace": namespace, "sets": sets})
}

fn indexes_summary(namespace: &str, ns: &Namespace) -> Value {
    let indexes: Vec<Value> = ns
        .indexes
        .iter()
        .map(|(name, def)| {
            json!({"name": name, "set_name": def.set, "bin_name": def.bin, "index_type": def.index_type})
        })
        .collect();
    json!({"namespace": namespace, "indexes": indexes})
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({"type": "object", "properties": properties, "required": required})
}

fn tool_descriptors() -> Vec<CapabilityDescriptor> {
    let ns = json!({"type": "string", "description": "Target namespace"});
    let set = json!({"type": "string", "description": "Target set (optional)"});
    let key = json!({"type": "string", "description": "Primary key"});

    vec![
        CapabilityDescriptor::new(
            "list_namespaces",
            "List all namespaces",
            json!({"type": "object"}),
        ),
        CapabilityDescriptor::new(
            "list_sets",
            "List sets in a namespace with object counts",
            schema(json!({"namespace": ns}), &["namespace"]),
        ),
        CapabilityDescriptor::new(
            "get_record",
            "Retrieve a single record by primary key",
            schema(
                json!({
                    "namespace": ns, "set_name": set, "key": key,
                    "bins": {"type": "array", "items": {"type": "string"}, "description": "Bins to return (default: all)"}
                }),
                &["namespace", "key"],
            ),
        ),
        CapabilityDescriptor::new(
            "batch_get",
            "Retrieve multiple records in one call",
            schema(
                json!({"namespace": ns, "set_name": set, "keys": {"type": "array", "description": "Keys or {key, set_name} objects"}}),
                &["namespace", "keys"],
            ),
        ),
        CapabilityDescriptor::new(
            "list_indexes",
            "Enumerate secondary indexes in a namespace",
            schema(json!({"namespace": ns}), &["namespace"]),
        ),
        CapabilityDescriptor::new(
            "put_record",
            "Insert or update a single record",
            schema(
                json!({"namespace": ns, "set_name": set, "key": key, "bins": {"type": "object", "description": "Bin name-value pairs"}}),
                &["namespace", "key", "bins"],
            ),
        ),
        CapabilityDescriptor::new(
            "delete_record",
            "Remove a single record by primary key",
            schema(
                json!({"namespace": ns, "set_name": set, "key": key}),
                &["namespace", "key"],
            ),
        ),
        CapabilityDescriptor::new(
            "batch_write",
            "Apply multiple put/delete operations",
            schema(
                json!({
                    "namespace": ns, "set_name": set,
                    "records": {"type": "array", "description": "{key, set_name?, bins?, operation: put|delete}"}
                }),
                &["namespace", "records"],
            ),
        ),
        CapabilityDescriptor::new(
            "truncate_set",
            "Remove all records from a set. Requires double confirmation.",
            schema(
                json!({
                    "namespace": ns, "set_name": {"type": "string", "description": "Target set"},
                    "confirm": {"type": "boolean"}, "confirm_destructive": {"type": "boolean"}
                }),
                &["namespace", "set_name", "confirm", "confirm_destructive"],
            ),
        ),
        CapabilityDescriptor::new(
            "create_index",
            "Create a secondary index on a bin",
            schema(
                json!({
                    "namespace": ns, "set_name": set,
                    "index_name": {"type": "string"}, "bin_name": {"type": "string"},
                    "index_type": {"type": "string", "enum": ["NUMERIC", "STRING", "GEO2DSPHERE", "BLOB"]}
                }),
                &["namespace", "index_name", "bin_name", "index_type"],
            ),
        ),
        CapabilityDescriptor::new(
            "drop_index",
            "Remove a secondary index. Requires confirmation.",
            schema(
                json!({"namespace": ns, "index_name": {"type": "string"}, "confirm": {"type": "boolean"}}),
                &["namespace", "index_name", "confirm"],
            ),
        ),
    ]
}
