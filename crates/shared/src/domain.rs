use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Brand,
    MasterDomain,
    IpRange,
    Domain,
    Ip,
}

/// Static facts about a resource kind, resolved once instead of re-branching on
/// the kind at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    pub slug: &'static str,
    pub plural: &'static str,
    pub identity_field: &'static str,
    pub display_name: &'static str,
    pub scannable: bool,
    pub sortable_fields: &'static [&'static str],
    pub filters: &'static [Filter],
}

pub const ID_SORT_FIELD: &str = "_id";

const SCANNABLE_SORT_FIELDS: &[&str] = &[ID_SORT_FIELD, "serviceLevel", "last_scan_date"];
const NON_SCANNABLE_SORT_FIELDS: &[&str] = &[ID_SORT_FIELD];

const NO_FILTERS: &[Filter] = &[Filter::All];
const SCOPE_FILTERS: &[Filter] = &[
    Filter::All,
    Filter::ToReview,
    Filter::InScope,
    Filter::OutOfScope,
];
const BLOCK_FILTERS: &[Filter] = &[Filter::All, Filter::Blocked, Filter::NotBlocked];

const BRAND: KindDescriptor = KindDescriptor {
    slug: "brand",
    plural: "brands",
    identity_field: "name",
    display_name: "brand",
    scannable: true,
    sortable_fields: SCANNABLE_SORT_FIELDS,
    filters: NO_FILTERS,
};

const MASTER_DOMAIN: KindDescriptor = KindDescriptor {
    slug: "masterdomain",
    plural: "masterdomains",
    identity_field: "name",
    display_name: "master domain",
    scannable: true,
    sortable_fields: SCANNABLE_SORT_FIELDS,
    filters: SCOPE_FILTERS,
};

const IP_RANGE: KindDescriptor = KindDescriptor {
    slug: "iprange",
    plural: "ipranges",
    identity_field: "cidr",
    display_name: "IP range",
    scannable: true,
    sortable_fields: SCANNABLE_SORT_FIELDS,
    filters: NO_FILTERS,
};

const DOMAIN: KindDescriptor = KindDescriptor {
    slug: "domain",
    plural: "domains",
    identity_field: "name",
    display_name: "domain",
    scannable: false,
    sortable_fields: NON_SCANNABLE_SORT_FIELDS,
    filters: BLOCK_FILTERS,
};

const IP: KindDescriptor = KindDescriptor {
    slug: "ip",
    plural: "ips",
    identity_field: "value",
    display_name: "IP",
    scannable: false,
    sortable_fields: NON_SCANNABLE_SORT_FIELDS,
    filters: BLOCK_FILTERS,
};

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Brand,
        ResourceKind::MasterDomain,
        ResourceKind::IpRange,
        ResourceKind::Domain,
        ResourceKind::Ip,
    ];

    pub fn descriptor(self) -> &'static KindDescriptor {
        match self {
            ResourceKind::Brand => &BRAND,
            ResourceKind::MasterDomain => &MASTER_DOMAIN,
            ResourceKind::IpRange => &IP_RANGE,
            ResourceKind::Domain => &DOMAIN,
            ResourceKind::Ip => &IP,
        }
    }

    pub fn is_scannable(self) -> bool {
        self.descriptor().scannable
    }

    pub fn supports_filter(self, filter: Filter) -> bool {
        self.descriptor().filters.contains(&filter)
    }

    pub fn supports_sort_field(self, field: &str) -> bool {
        self.descriptor().sortable_fields.contains(&field)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().slug)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource kind '{0}'")]
pub struct UnknownResourceKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownResourceKind;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        ResourceKind::ALL
            .into_iter()
            .find(|kind| {
                let descriptor = kind.descriptor();
                descriptor.slug == wanted || descriptor.plural == wanted
            })
            .ok_or(UnknownResourceKind(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ServiceLevel {
    Gold,
    Silver,
    Bronze,
}

impl From<u8> for ServiceLevel {
    fn from(value: u8) -> Self {
        match value {
            1 => ServiceLevel::Gold,
            2 => ServiceLevel::Silver,
            _ => ServiceLevel::Bronze,
        }
    }
}

impl From<ServiceLevel> for u8 {
    fn from(value: ServiceLevel) -> Self {
        match value {
            ServiceLevel::Gold => 1,
            ServiceLevel::Silver => 2,
            ServiceLevel::Bronze => 3,
        }
    }
}

impl fmt::Display for ServiceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceLevel::Gold => "Gold",
            ServiceLevel::Silver => "Silver",
            ServiceLevel::Bronze => "Bronze",
        };
        f.write_str(label)
    }
}

/// A record as returned by the inventory API.
///
/// Only the identity and the handful of attributes used for display and
/// mutation routing are typed; everything else rides along untouched so that an
/// update can send back exactly what was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Resource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Display value for the kind's identity field, falling back to the id.
    pub fn identity(&self, kind: ResourceKind) -> &str {
        self.attributes
            .get(kind.descriptor().identity_field)
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }

    pub fn blocked(&self) -> bool {
        self.flag("blocked")
    }

    pub fn in_scope(&self) -> bool {
        self.flag("inScope")
    }

    pub fn reviewed(&self) -> bool {
        self.flag("reviewed")
    }

    pub fn service_level(&self) -> Option<ServiceLevel> {
        self.attributes
            .get("serviceLevel")
            .and_then(Value::as_u64)
            .map(|level| ServiceLevel::from(u8::try_from(level).unwrap_or(u8::MAX)))
    }

    pub fn last_scan_date(&self) -> Option<DateTime<Utc>> {
        let raw = self
            .attributes
            .get("last_scan_date")
            .or_else(|| self.attributes.get("lastScanDate"))?;
        match raw {
            Value::String(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc)),
            Value::Number(millis) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
            _ => None,
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Payload for creating a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum NewResource {
    Scannable {
        identity: String,
        service_level: ServiceLevel,
        in_scope: bool,
        reviewed: bool,
    },
    NonScannable {
        identity: String,
        block_after_create: bool,
    },
}

impl NewResource {
    pub fn identity(&self) -> &str {
        match self {
            NewResource::Scannable { identity, .. } | NewResource::NonScannable { identity, .. } => {
                identity
            }
        }
    }

    pub fn block_after_create(&self) -> bool {
        matches!(
            self,
            NewResource::NonScannable {
                block_after_create: true,
                ..
            }
        )
    }

    pub fn matches_kind(&self, kind: ResourceKind) -> bool {
        matches!(self, NewResource::Scannable { .. }) == kind.is_scannable()
    }

    /// Wire body for `POST /<plural>`.
    pub fn to_json(&self, kind: ResourceKind) -> Value {
        let mut body = Map::new();
        body.insert(
            kind.descriptor().identity_field.to_string(),
            Value::String(self.identity().to_string()),
        );
        if let NewResource::Scannable {
            service_level,
            in_scope,
            reviewed,
            ..
        } = self
        {
            body.insert(
                "serviceLevel".to_string(),
                Value::from(u8::from(*service_level)),
            );
            if kind == ResourceKind::MasterDomain {
                body.insert("inScope".to_string(), Value::Bool(*in_scope));
                body.insert("reviewed".to_string(), Value::Bool(*reviewed));
            }
        }
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_kinds_from_slug_or_plural() {
        assert_eq!("iprange".parse::<ResourceKind>(), Ok(ResourceKind::IpRange));
        assert_eq!("IPs".parse::<ResourceKind>(), Ok(ResourceKind::Ip));
        assert!("host".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn descriptors_split_scannable_and_blockable_kinds() {
        assert!(ResourceKind::MasterDomain.supports_filter(Filter::ToReview));
        assert!(!ResourceKind::MasterDomain.supports_filter(Filter::Blocked));
        assert!(ResourceKind::Ip.supports_filter(Filter::NotBlocked));
        assert!(!ResourceKind::Brand.supports_filter(Filter::InScope));
        assert!(ResourceKind::IpRange.supports_sort_field("last_scan_date"));
        assert!(!ResourceKind::Domain.supports_sort_field("serviceLevel"));
        assert_eq!(ResourceKind::IpRange.descriptor().identity_field, "cidr");
    }

    #[test]
    fn unknown_service_level_falls_back_to_bronze() {
        let resource: Resource =
            serde_json::from_value(json!({"id": "acme", "name": "acme", "serviceLevel": 7}))
                .expect("resource");
        assert_eq!(resource.service_level(), Some(ServiceLevel::Bronze));
        assert_eq!(resource.identity(ResourceKind::Brand), "acme");
    }

    #[test]
    fn resource_keeps_unknown_attributes_for_updates() {
        let raw = json!({"id": "10.0.0.0/8", "cidr": "10.0.0.0/8", "description": "lab"});
        let resource: Resource = serde_json::from_value(raw.clone()).expect("resource");
        assert_eq!(serde_json::to_value(&resource).expect("json"), raw);
    }

    #[test]
    fn master_domain_create_body_carries_review_flags() {
        let payload = NewResource::Scannable {
            identity: "example.com".into(),
            service_level: ServiceLevel::Silver,
            in_scope: true,
            reviewed: false,
        };
        assert_eq!(
            payload.to_json(ResourceKind::MasterDomain),
            json!({"name": "example.com", "serviceLevel": 2, "inScope": true, "reviewed": false})
        );
        assert_eq!(
            payload.to_json(ResourceKind::IpRange),
            json!({"cidr": "example.com", "serviceLevel": 2})
        );
    }

    #[test]
    fn parses_millisecond_scan_dates() {
        let resource = Resource::new("a").with_attribute("lastScanDate", 0);
        assert_eq!(
            resource.last_scan_date(),
            DateTime::from_timestamp_millis(0)
        );
    }
}
