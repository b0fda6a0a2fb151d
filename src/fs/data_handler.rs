//! Per-object-kind JSON normalization
//!
//! Two JSON documents describing the same object may differ only in keys
//! left at their defaults. Normalizing both sides fills the defaults in
//! before comparing; minimizing strips them back out for writing.

use serde_json::{json, Map, Value};

/// Object kind, chosen by the top-level directory an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
	Acl,
	Client,
	Container,
	DataBagItem,
	Environment,
	Group,
	Node,
	Organization,
	Policy,
	PolicyGroup,
	Role,
	User,
}

impl ObjectKind {
	/// Kind of the objects stored under a top-level directory
	pub fn for_dir(dir: &str) -> Option<Self> {
		match dir {
			"acls" => Some(ObjectKind::Acl),
			"clients" => Some(ObjectKind::Client),
			"containers" => Some(ObjectKind::Container),
			"data_bags" => Some(ObjectKind::DataBagItem),
			"environments" => Some(ObjectKind::Environment),
			"groups" => Some(ObjectKind::Group),
			"nodes" => Some(ObjectKind::Node),
			"policies" => Some(ObjectKind::Policy),
			"policy_groups" => Some(ObjectKind::PolicyGroup),
			"roles" => Some(ObjectKind::Role),
			"users" => Some(ObjectKind::User),
			_ => None,
		}
	}

	/// Kinds that may also be written as Ruby DSL files
	pub fn allows_ruby(&self) -> bool {
		matches!(self, ObjectKind::Role | ObjectKind::Environment)
	}

	/// Key that must stay in minimized output
	pub fn identity_key(&self) -> Option<&'static str> {
		match self {
			ObjectKind::DataBagItem => Some("id"),
			ObjectKind::Acl | ObjectKind::Organization | ObjectKind::Policy => None,
			_ => Some("name"),
		}
	}

	/// Object with every key at its default value
	pub fn default_object(&self, name: &str) -> Value {
		match self {
			ObjectKind::Role => json!({
				"name": name,
				"description": "",
				"json_class": "Chef::Role",
				"chef_type": "role",
				"default_attributes": {},
				"override_attributes": {},
				"run_list": [],
				"env_run_lists": {},
			}),
			ObjectKind::Environment => json!({
				"name": name,
				"description": "",
				"cookbook_versions": {},
				"default_attributes": {},
				"override_attributes": {},
				"json_class": "Chef::Environment",
				"chef_type": "environment",
			}),
			ObjectKind::Node => json!({
				"name": name,
				"json_class": "Chef::Node",
				"chef_type": "node",
				"chef_environment": "_default",
				"override": {},
				"normal": {},
				"default": {},
				"automatic": {},
				"run_list": [],
			}),
			ObjectKind::Client => json!({
				"name": name,
				"clientname": name,
				"admin": false,
				"validator": false,
				"json_class": "Chef::ApiClient",
				"chef_type": "client",
			}),
			ObjectKind::User => json!({
				"name": name,
				"username": name,
				"admin": false,
			}),
			ObjectKind::Container => json!({
				"name": name,
				"containername": name,
				"containerpath": name,
			}),
			ObjectKind::Group => json!({
				"name": name,
				"groupname": name,
				"users": [],
				"clients": [],
				"groups": [],
			}),
			ObjectKind::PolicyGroup => json!({
				"name": name,
				"policies": {},
			}),
			ObjectKind::DataBagItem => json!({ "id": name }),
			ObjectKind::Acl | ObjectKind::Organization | ObjectKind::Policy => json!({}),
		}
	}

	/// Fill in defaults; keys present in `object` win
	pub fn normalize(&self, object: &Value, name: &str) -> Value {
		let object = unwrap_data_bag_item(*self, object);
		let mut result = match self.default_object(name) {
			Value::Object(map) => map,
			_ => Map::new(),
		};
		if let Value::Object(map) = object {
			for (key, value) in map {
				result.insert(key.clone(), value.clone());
			}
		} else {
			return object.clone();
		}
		Value::Object(result)
	}

	/// Normalize, then drop keys left at their default value
	pub fn minimize(&self, object: &Value, name: &str) -> Value {
		let normalized = self.normalize(object, name);
		let defaults = self.default_object(name);
		let identity = self.identity_key();
		match normalized {
			Value::Object(map) => Value::Object(
				map.into_iter()
					.filter(|(key, value)| {
						Some(key.as_str()) == identity || defaults.get(key) != Some(value)
					})
					.collect(),
			),
			other => other,
		}
	}
}

/// Data bag items may arrive wrapped as `{"json_class": ..., "raw_data": {...}}`
fn unwrap_data_bag_item(kind: ObjectKind, object: &Value) -> &Value {
	if kind == ObjectKind::DataBagItem
		&& object.get("json_class").and_then(Value::as_str) == Some("Chef::DataBagItem")
	{
		if let Some(raw) = object.get("raw_data") {
			return raw;
		}
	}
	object
}

/// Object name for an entry name (`web.json` -> `web`)
pub fn object_name(entry_name: &str) -> &str {
	entry_name
		.strip_suffix(".json")
		.or_else(|| entry_name.strip_suffix(".rb"))
		.unwrap_or(entry_name)
}

/// Compare two JSON documents as objects of `kind`.
///
/// `None` when either side is not JSON.
pub fn same_object(kind: ObjectKind, name: &str, a: &[u8], b: &[u8]) -> Option<bool> {
	let a: Value = serde_json::from_slice(a).ok()?;
	let b: Value = serde_json::from_slice(b).ok()?;
	Some(kind.minimize(&a, name) == kind.minimize(&b, name))
}

/// Pretty JSON with a trailing newline, the on-disk format
pub fn to_pretty_json(value: &Value) -> Vec<u8> {
	let mut bytes = serde_json::to_vec_pretty(value).unwrap_or_default();
	bytes.push(b'\n');
	bytes
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_minimize_drops_defaults_keeps_name() {
		let role = json!({"name": "web", "description": "", "run_list": ["recipe[app]"]});
		let minimized = ObjectKind::Role.minimize(&role, "web");
		assert_eq!(minimized, json!({"name": "web", "run_list": ["recipe[app]"]}));
	}

	#[test]
	fn test_normalize_fills_defaults() {
		let env = ObjectKind::Environment.normalize(&json!({}), "prod");
		assert_eq!(env["name"], "prod");
		assert_eq!(env["chef_type"], "environment");
	}

	#[test]
	fn test_same_object_ignores_defaults() {
		let a = br#"{"name":"web","json_class":"Chef::Role"}"#;
		let b = br#"{"name":"web"}"#;
		assert_eq!(same_object(ObjectKind::Role, "web", a, b), Some(true));
		assert_eq!(same_object(ObjectKind::Role, "web", a, b"role 'web'"), None);
	}

	#[test]
	fn test_data_bag_item_unwrap() {
		let wrapped = json!({"json_class": "Chef::DataBagItem", "raw_data": {"id": "x", "v": 1}});
		assert_eq!(ObjectKind::DataBagItem.minimize(&wrapped, "x"), json!({"id": "x", "v": 1}));
	}

	#[test]
	fn test_object_name() {
		assert_eq!(object_name("web.json"), "web");
		assert_eq!(object_name("web.rb"), "web");
		assert_eq!(object_name("web"), "web");
	}
}

// vim: ts=4
