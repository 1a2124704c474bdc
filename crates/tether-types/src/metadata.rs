//! Module metadata files.
//!
//! The managed build writes one `{module}.metadata.json` per module:
//!
//! ```json
//! {
//!   "ClassMetaData":      [ { "Name": "Hero", "ParentClass": { "Name": "Actor" }, ... } ],
//!   "StructMetaData":     [ { "Name": "Stats", "Properties": [ { "Name": "Hp", "Type": "int" } ] } ],
//!   "EnumMetaData":       [ { "Name": "Team", "Items": [ "Red", "Blue" ] } ],
//!   "InterfacesMetaData": [ { "Name": "Damageable", "Functions": [ { "Name": "TakeHit" } ] } ]
//! }
//! ```

use std::path::Path;

use serde::Deserialize;
use tether_core::{MemberDescriptor, TypeKind, TypeMetadataRecord, TypeReference};

use crate::error::RegistryError;

pub const METADATA_SUFFIX: &str = ".metadata.json";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawModule {
    #[serde(default)]
    class_meta_data: Vec<RawType>,
    #[serde(default)]
    struct_meta_data: Vec<RawType>,
    #[serde(default)]
    enum_meta_data: Vec<RawType>,
    #[serde(default)]
    interfaces_meta_data: Vec<RawType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawType {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    assembly_name: String,
    #[serde(default)]
    parent_class: Option<RawTypeRef>,
    #[serde(default)]
    properties: Vec<RawProperty>,
    #[serde(default)]
    functions: Vec<RawFunction>,
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    interfaces: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTypeRef {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    assembly_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawProperty {
    name: String,
    #[serde(default, rename = "Type")]
    type_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawFunction {
    name: String,
    #[serde(default)]
    return_type: Option<String>,
}

impl RawType {
    fn into_record(self, kind: TypeKind) -> TypeMetadataRecord {
        let mut members = Vec::with_capacity(
            self.properties.len() + self.functions.len() + self.items.len(),
        );
        members.extend(
            self.properties
                .into_iter()
                .map(|p| MemberDescriptor::property(p.name, p.type_name)),
        );
        members.extend(self.functions.into_iter().map(|f| MemberDescriptor {
            type_name: f.return_type,
            ..MemberDescriptor::function(f.name)
        }));
        members.extend(self.items.into_iter().map(MemberDescriptor::enum_item));

        TypeMetadataRecord {
            kind,
            name: self.name,
            namespace: self.namespace,
            assembly: self.assembly_name,
            parent: self.parent_class.map(|p| TypeReference {
                name: p.name,
                namespace: p.namespace,
                assembly: p.assembly_name,
            }),
            members,
            interfaces: self.interfaces,
            display_name: None,
        }
    }
}

/// All type records of one module, classes first, then structs, enums and
/// interfaces.
#[derive(Debug, Clone)]
pub struct ModuleMetadata {
    pub module: String,
    pub records: Vec<TypeMetadataRecord>,
}

impl ModuleMetadata {
    pub fn parse(module: impl Into<String>, json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawModule = serde_json::from_str(json)?;
        let groups = [
            (TypeKind::Class, raw.class_meta_data),
            (TypeKind::Struct, raw.struct_meta_data),
            (TypeKind::Enum, raw.enum_meta_data),
            (TypeKind::Interface, raw.interfaces_meta_data),
        ];

        let records = groups
            .into_iter()
            .flat_map(|(kind, types)| types.into_iter().map(move |t| t.into_record(kind)))
            .collect();

        Ok(Self {
            module: module.into(),
            records,
        })
    }

    /// Read and parse a metadata file. Both a missing file and malformed
    /// JSON are fatal for the module.
    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        let display = path.display().to_string();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::MetadataMissing(display));
            }
            Err(source) => {
                return Err(RegistryError::MetadataUnreadable {
                    path: display,
                    source,
                });
            }
        };

        Self::parse(module_name(path), &content).map_err(|source| {
            RegistryError::MetadataMalformed {
                path: display,
                source,
            }
        })
    }
}

/// Module name for a metadata path: `Game.metadata.json` → `Game`.
pub fn module_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.strip_suffix(METADATA_SUFFIX) {
        Some(stem) => stem.to_string(),
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(file_name),
    }
}
