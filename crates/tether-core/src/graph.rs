//! Visual-scripting graph model the reinstancer patches.
//!
//! These mirror the parts of an editor graph that can hold a type identity:
//! variable declarations, pin types and function bindings.

use crate::types::NativeTypeId;

/// Pin category as reported by the graph schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PinCategory {
    Exec,
    Boolean,
    Byte,
    Int,
    Float,
    String,
    Name,
    Struct,
    Enum,
    Object,
    Class,
    SoftObject,
    SoftClass,
    Interface,
    Wildcard,
}

/// Declared type of a pin or variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinType {
    pub category: PinCategory,
    /// The type object the category refers to, e.g. the struct of a struct pin.
    pub sub_category_object: Option<NativeTypeId>,
}

/// The part of a pin type that may reference a reloadable type, tagged by
/// how the reinstancer has to treat it.
#[derive(Debug, PartialEq, Eq)]
pub enum PinTarget<'a> {
    Struct(&'a mut Option<NativeTypeId>),
    EnumOrByte(&'a mut Option<NativeTypeId>),
    ClassLike(&'a mut Option<NativeTypeId>),
    Untyped,
}

impl PinType {
    pub fn new(category: PinCategory, sub_category_object: Option<NativeTypeId>) -> Self {
        Self {
            category,
            sub_category_object,
        }
    }

    pub fn of_struct(id: NativeTypeId) -> Self {
        Self::new(PinCategory::Struct, Some(id))
    }

    pub fn of_enum(id: NativeTypeId) -> Self {
        Self::new(PinCategory::Enum, Some(id))
    }

    pub fn of_object(id: NativeTypeId) -> Self {
        Self::new(PinCategory::Object, Some(id))
    }

    pub fn target_mut(&mut self) -> PinTarget<'_> {
        let object = &mut self.sub_category_object;
        match self.category {
            PinCategory::Struct => PinTarget::Struct(object),
            PinCategory::Enum | PinCategory::Byte => PinTarget::EnumOrByte(object),
            PinCategory::Object
            | PinCategory::Class
            | PinCategory::SoftObject
            | PinCategory::SoftClass
            | PinCategory::Interface => PinTarget::ClassLike(object),
            _ => PinTarget::Untyped,
        }
    }

    /// The enum an enum or byte pin refers to, if any.
    pub fn enum_reference(&self) -> Option<NativeTypeId> {
        match self.category {
            PinCategory::Enum | PinCategory::Byte => self.sub_category_object,
            _ => None,
        }
    }
}

/// Reference from a node to a member function of some type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberReference {
    pub parent: Option<NativeTypeId>,
    pub member_name: String,
}

/// A resolved function on a native type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    pub owner: NativeTypeId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Calls a member function.
    CallFunction { function: MemberReference },
    /// Spawns an async action through a factory function on a proxy class.
    AsyncAction {
        proxy_class: Option<NativeTypeId>,
        factory_function: String,
        bound: Option<FunctionRef>,
    },
    /// Function entry/result or event node whose pins are user-defined.
    EditablePins { user_pins: Vec<PinType> },
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub pins: Vec<PinType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDescription {
    pub name: String,
    pub var_type: PinType,
}

/// A visual-scripting asset: its declared variables and graph nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blueprint {
    pub name: String,
    pub variables: Vec<VariableDescription>,
    pub nodes: Vec<GraphNode>,
}

impl Blueprint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Variable types, user-defined pins and node pins, in that order.
    pub fn pin_types(&self) -> impl Iterator<Item = &PinType> {
        let variables = self.variables.iter().map(|v| &v.var_type);
        let nodes = self.nodes.iter().flat_map(|node| {
            let user_pins: &[PinType] = match &node.kind {
                NodeKind::EditablePins { user_pins } => user_pins.as_slice(),
                _ => &[],
            };
            user_pins.iter().chain(&node.pins)
        });
        variables.chain(nodes)
    }
}

/// Identity of a row-typed data table in the native framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_and_enum_pins_share_a_target() {
        let mut byte = PinType::new(PinCategory::Byte, Some(NativeTypeId::new(3)));
        assert!(matches!(byte.target_mut(), PinTarget::EnumOrByte(_)));

        let mut en = PinType::of_enum(NativeTypeId::new(3));
        assert!(matches!(en.target_mut(), PinTarget::EnumOrByte(_)));
    }

    #[test]
    fn soft_references_are_class_like() {
        for category in [
            PinCategory::Object,
            PinCategory::Class,
            PinCategory::SoftObject,
            PinCategory::SoftClass,
        ] {
            let mut pin = PinType::new(category, None);
            assert!(matches!(pin.target_mut(), PinTarget::ClassLike(_)));
        }
    }

    #[test]
    fn primitive_pins_are_untyped() {
        let mut pin = PinType::new(PinCategory::Float, None);
        assert_eq!(pin.target_mut(), PinTarget::Untyped);
    }

    #[test]
    fn blueprint_lists_every_pin() {
        let mut blueprint = Blueprint::new("Door");
        blueprint.variables.push(VariableDescription {
            name: "Team".into(),
            var_type: PinType::of_enum(NativeTypeId::new(4)),
        });
        blueprint.nodes.push(GraphNode {
            id: NodeId(1),
            kind: NodeKind::EditablePins {
                user_pins: vec![PinType::of_struct(NativeTypeId::new(5))],
            },
            pins: vec![PinType::new(PinCategory::Byte, Some(NativeTypeId::new(6)))],
        });

        assert_eq!(blueprint.pin_types().count(), 3);
        let enums: Vec<_> = blueprint.pin_types().filter_map(PinType::enum_reference).collect();
        assert_eq!(enums, vec![NativeTypeId::new(4), NativeTypeId::new(6)]);
    }

    #[test]
    fn target_writes_through() {
        let mut pin = PinType::of_struct(NativeTypeId::new(1));
        if let PinTarget::Struct(object) = pin.target_mut() {
            *object = Some(NativeTypeId::new(2));
        }
        assert_eq!(pin.sub_category_object, Some(NativeTypeId::new(2)));
    }
}
