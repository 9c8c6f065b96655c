use serde::Deserialize;
use serde_json::Value;

use super::{not_found, parse_payload, require_name, Element, ElementAccessor, SubElementContainer, SubElementKind};
use crate::error::{ProjectionError, Result};
use crate::names;
use crate::projection::Projection;
use crate::repository::{Node, PropertyType, PropertyValue};
use crate::representation::{OrderedMap, PropertyRepresentation};

/// Serves a node's `properties` container.
///
/// `create` is an upsert: an existing, unprotected property has its value
/// replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertiesAccessor;

/// Payload for a property value: either `{"value": ..., "type": ...}` or the
/// bare JSON value.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum PropertyInput {
    Typed {
        value: Value,
        #[serde(rename = "type", default)]
        property_type: Option<PropertyType>,
    },
    Bare(Value),
}

impl PropertyInput {
    /// Convert to a typed repository value. Without an explicit type, the
    /// `fallback` is used, then the JSON kind of the value.
    pub(super) fn resolve(
        &self,
        fallback: Option<PropertyType>,
    ) -> Result<(PropertyType, PropertyValue)> {
        let (value, explicit) = match self {
            PropertyInput::Typed {
                value,
                property_type,
            } => (value, *property_type),
            PropertyInput::Bare(value) => (value, None),
        };

        let property_value = match value {
            Value::Array(items) => PropertyValue::Multiple(
                items.iter().map(scalar_text).collect::<Result<Vec<_>>>()?,
            ),
            other => PropertyValue::Single(scalar_text(other)?),
        };

        let property_type = explicit
            .or(fallback)
            .unwrap_or_else(|| infer_type(value));
        Ok((property_type, property_value))
    }
}

fn scalar_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => Err(ProjectionError::BadRequest(
            format!("property values must be strings, numbers or booleans, got {value}"),
        )),
    }
}

fn infer_type(value: &Value) -> PropertyType {
    let sample = match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    match sample {
        Some(Value::Bool(_)) => PropertyType::Boolean,
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => PropertyType::Long,
        Some(Value::Number(_)) => PropertyType::Double,
        _ => PropertyType::String,
    }
}

impl ElementAccessor for PropertiesAccessor {
    fn kind(&self) -> SubElementKind {
        SubElementKind::Properties
    }

    fn get_container(&self, ctx: &Projection<'_>, node: &Node) -> Result<SubElementContainer> {
        let mut entries = OrderedMap::new();
        for property in ctx.session.properties(node)? {
            let representation = PropertyRepresentation::build(ctx, &property)?;
            entries.insert(names::escape(&property.name), Element::Property(representation));
        }
        Ok(SubElementContainer::new(ctx, node, self.kind(), entries))
    }

    fn get_element(&self, ctx: &Projection<'_>, node: &Node, name: &str) -> Result<Element> {
        let property = ctx
            .session
            .property(node, &names::unescape(name))?
            .ok_or_else(|| not_found(self.kind(), node, name))?;
        Ok(Element::Property(PropertyRepresentation::build(ctx, &property)?))
    }

    fn create(
        &self,
        ctx: &Projection<'_>,
        node: &Node,
        name: &str,
        data: Option<&Value>,
    ) -> Result<Element> {
        require_name(name)?;
        let data = data.ok_or_else(|| {
            ProjectionError::BadRequest("a property value is required".into())
        })?;
        let input: PropertyInput = parse_payload(data)?;
        let name = names::unescape(name);

        let existing = ctx.session.property(node, &name)?;
        let fallback = match &existing {
            Some(property) => {
                if ctx.session.property_definition(property)?.protected {
                    return Err(ProjectionError::MethodNotAllowed(format!(
                        "property {name} is protected"
                    )));
                }
                Some(property.property_type)
            }
            None => None,
        };

        let (property_type, value) = input.resolve(fallback)?;
        let property = ctx.session.set_property(node, &name, property_type, value)?;
        ctx.session.save()?;
        tracing::debug!(node = %node.path, property = %name, "property set");

        Ok(Element::Property(PropertyRepresentation::build(ctx, &property)?))
    }

    fn delete(&self, ctx: &Projection<'_>, node: &Node, name: &str) -> Result<Element> {
        require_name(name)?;
        let name = names::unescape(name);
        let property = ctx
            .session
            .property(node, &name)?
            .ok_or_else(|| not_found(self.kind(), node, &name))?;
        if ctx.session.property_definition(&property)?.protected {
            return Err(ProjectionError::MethodNotAllowed(format!(
                "property {name} is protected"
            )));
        }

        let representation = PropertyRepresentation::build(ctx, &property)?;
        ctx.session.remove_property(node, &name)?;
        ctx.session.save()?;
        tracing::debug!(node = %node.path, property = %name, "property removed");

        Ok(Element::Property(representation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(value: Value) -> PropertyInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn typed_and_bare_payloads() {
        let (ty, value) = input(json!({"value": "2024-01-01T00:00:00Z", "type": "Date"}))
            .resolve(None)
            .unwrap();
        assert_eq!(ty, PropertyType::Date);
        assert_eq!(value, PropertyValue::Single("2024-01-01T00:00:00Z".into()));

        let (ty, value) = input(json!(["a", "b"])).resolve(None).unwrap();
        assert_eq!(ty, PropertyType::String);
        assert_eq!(value, PropertyValue::Multiple(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn type_inferred_from_json_kind_or_existing_property() {
        assert_eq!(input(json!(3)).resolve(None).unwrap().0, PropertyType::Long);
        assert_eq!(input(json!(3.5)).resolve(None).unwrap().0, PropertyType::Double);
        assert_eq!(input(json!({"value": true})).resolve(None).unwrap().0, PropertyType::Boolean);
        assert_eq!(
            input(json!("x")).resolve(Some(PropertyType::Name)).unwrap().0,
            PropertyType::Name
        );
    }

    #[test]
    fn nested_values_are_rejected() {
        assert!(matches!(
            input(json!({"nested": {"a": 1}})).resolve(None),
            Err(ProjectionError::BadRequest(_))
        ));
        assert!(matches!(
            input(json!([null])).resolve(None),
            Err(ProjectionError::BadRequest(_))
        ));
    }
}
