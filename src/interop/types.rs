//! Signature descriptors for values crossing the script boundary
//!
//! Defines the closed kind taxonomy and the method/property descriptors a
//! host hands over in plugin manifests.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::jit::JitError;

/// Closed set of value kinds understood by both sides of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueKind {
    #[serde(rename = "void")]
    Void,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "char8")]
    Char8,
    #[serde(rename = "char16")]
    Char16,
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    #[serde(rename = "ptr64")]
    Pointer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "vec2")]
    Vector2,
    #[serde(rename = "vec3")]
    Vector3,
    #[serde(rename = "vec4")]
    Vector4,
    #[serde(rename = "mat4x4")]
    Matrix4x4,

    #[serde(rename = "bool[]")]
    ArrayBool,
    #[serde(rename = "char8[]")]
    ArrayChar8,
    #[serde(rename = "char16[]")]
    ArrayChar16,
    #[serde(rename = "int8[]")]
    ArrayInt8,
    #[serde(rename = "int16[]")]
    ArrayInt16,
    #[serde(rename = "int32[]")]
    ArrayInt32,
    #[serde(rename = "int64[]")]
    ArrayInt64,
    #[serde(rename = "uint8[]")]
    ArrayUInt8,
    #[serde(rename = "uint16[]")]
    ArrayUInt16,
    #[serde(rename = "uint32[]")]
    ArrayUInt32,
    #[serde(rename = "uint64[]")]
    ArrayUInt64,
    #[serde(rename = "ptr64[]")]
    ArrayPointer,
    #[serde(rename = "float[]")]
    ArrayFloat,
    #[serde(rename = "double[]")]
    ArrayDouble,
    #[serde(rename = "string[]")]
    ArrayString,
    #[serde(rename = "any[]")]
    ArrayAny,
    #[serde(rename = "vec2[]")]
    ArrayVector2,
    #[serde(rename = "vec3[]")]
    ArrayVector3,
    #[serde(rename = "vec4[]")]
    ArrayVector4,
    #[serde(rename = "mat4x4[]")]
    ArrayMatrix4x4,
}

impl ValueKind {
    /// Every kind, in declaration order
    pub const ALL: [ValueKind; 42] = [
        Self::Void,
        Self::Bool,
        Self::Char8,
        Self::Char16,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Pointer,
        Self::Float,
        Self::Double,
        Self::Function,
        Self::String,
        Self::Any,
        Self::Vector2,
        Self::Vector3,
        Self::Vector4,
        Self::Matrix4x4,
        Self::ArrayBool,
        Self::ArrayChar8,
        Self::ArrayChar16,
        Self::ArrayInt8,
        Self::ArrayInt16,
        Self::ArrayInt32,
        Self::ArrayInt64,
        Self::ArrayUInt8,
        Self::ArrayUInt16,
        Self::ArrayUInt32,
        Self::ArrayUInt64,
        Self::ArrayPointer,
        Self::ArrayFloat,
        Self::ArrayDouble,
        Self::ArrayString,
        Self::ArrayAny,
        Self::ArrayVector2,
        Self::ArrayVector3,
        Self::ArrayVector4,
        Self::ArrayMatrix4x4,
    ];

    /// Manifest name of the kind
    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Char8 => "char8",
            Self::Char16 => "char16",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Pointer => "ptr64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Function => "function",
            Self::String => "string",
            Self::Any => "any",
            Self::Vector2 => "vec2",
            Self::Vector3 => "vec3",
            Self::Vector4 => "vec4",
            Self::Matrix4x4 => "mat4x4",
            Self::ArrayBool => "bool[]",
            Self::ArrayChar8 => "char8[]",
            Self::ArrayChar16 => "char16[]",
            Self::ArrayInt8 => "int8[]",
            Self::ArrayInt16 => "int16[]",
            Self::ArrayInt32 => "int32[]",
            Self::ArrayInt64 => "int64[]",
            Self::ArrayUInt8 => "uint8[]",
            Self::ArrayUInt16 => "uint16[]",
            Self::ArrayUInt32 => "uint32[]",
            Self::ArrayUInt64 => "uint64[]",
            Self::ArrayPointer => "ptr64[]",
            Self::ArrayFloat => "float[]",
            Self::ArrayDouble => "double[]",
            Self::ArrayString => "string[]",
            Self::ArrayAny => "any[]",
            Self::ArrayVector2 => "vec2[]",
            Self::ArrayVector3 => "vec3[]",
            Self::ArrayVector4 => "vec4[]",
            Self::ArrayMatrix4x4 => "mat4x4[]",
        }
    }

    /// Look a kind up by its manifest name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Element kind of an array kind
    pub const fn element(self) -> Option<ValueKind> {
        Some(match self {
            Self::ArrayBool => Self::Bool,
            Self::ArrayChar8 => Self::Char8,
            Self::ArrayChar16 => Self::Char16,
            Self::ArrayInt8 => Self::Int8,
            Self::ArrayInt16 => Self::Int16,
            Self::ArrayInt32 => Self::Int32,
            Self::ArrayInt64 => Self::Int64,
            Self::ArrayUInt8 => Self::UInt8,
            Self::ArrayUInt16 => Self::UInt16,
            Self::ArrayUInt32 => Self::UInt32,
            Self::ArrayUInt64 => Self::UInt64,
            Self::ArrayPointer => Self::Pointer,
            Self::ArrayFloat => Self::Float,
            Self::ArrayDouble => Self::Double,
            Self::ArrayString => Self::String,
            Self::ArrayAny => Self::Any,
            Self::ArrayVector2 => Self::Vector2,
            Self::ArrayVector3 => Self::Vector3,
            Self::ArrayVector4 => Self::Vector4,
            Self::ArrayMatrix4x4 => Self::Matrix4x4,
            _ => return None,
        })
    }

    /// Array kind holding elements of this kind
    pub const fn array_of(self) -> Option<ValueKind> {
        Some(match self {
            Self::Bool => Self::ArrayBool,
            Self::Char8 => Self::ArrayChar8,
            Self::Char16 => Self::ArrayChar16,
            Self::Int8 => Self::ArrayInt8,
            Self::Int16 => Self::ArrayInt16,
            Self::Int32 => Self::ArrayInt32,
            Self::Int64 => Self::ArrayInt64,
            Self::UInt8 => Self::ArrayUInt8,
            Self::UInt16 => Self::ArrayUInt16,
            Self::UInt32 => Self::ArrayUInt32,
            Self::UInt64 => Self::ArrayUInt64,
            Self::Pointer => Self::ArrayPointer,
            Self::Float => Self::ArrayFloat,
            Self::Double => Self::ArrayDouble,
            Self::String => Self::ArrayString,
            Self::Any => Self::ArrayAny,
            Self::Vector2 => Self::ArrayVector2,
            Self::Vector3 => Self::ArrayVector3,
            Self::Vector4 => Self::ArrayVector4,
            Self::Matrix4x4 => Self::ArrayMatrix4x4,
            _ => return None,
        })
    }

    #[inline]
    pub const fn is_array(self) -> bool {
        self.element().is_some()
    }

    /// Check if type is integral
    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 |
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64
        )
    }

    #[inline]
    pub const fn is_struct(self) -> bool {
        matches!(self, Self::Vector2 | Self::Vector3 | Self::Vector4 | Self::Matrix4x4)
    }

    /// Kinds whose native slot always holds a pointer to the value
    #[inline]
    pub const fn is_passed_by_pointer(self) -> bool {
        matches!(self, Self::String | Self::Any) || self.is_struct() || self.is_array()
    }

    /// Kinds returned through a leading out-pointer instead of a register
    #[inline]
    pub const fn is_hidden_return(self) -> bool {
        matches!(
            self,
            Self::String | Self::Any | Self::Vector3 | Self::Vector4 | Self::Matrix4x4
        ) || self.is_array()
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for ValueKind {
    type Error = u8;

    /// Decode a raw kind tag as handed over by a native host
    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(tag as usize).copied().ok_or(tag)
    }
}

/// One named constant of an enum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

/// Enumeration attached to an integral property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: String,
    #[serde(default)]
    pub values: Vec<EnumValue>,
}

/// Parameter or return slot of a method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    #[serde(rename = "type")]
    pub kind: ValueKind,

    #[serde(rename = "ref", default)]
    pub by_ref: bool,

    /// Signature of the callable (Function kind only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prototype: Option<Box<MethodSignature>>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enumerator: Option<EnumDescriptor>,
}

impl PropertyDescriptor {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            by_ref: false,
            prototype: None,
            enumerator: None,
        }
    }

    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }

    pub fn with_prototype(mut self, prototype: MethodSignature) -> Self {
        self.prototype = Some(Box::new(prototype));
        self
    }

    pub fn with_enum(mut self, enumerator: EnumDescriptor) -> Self {
        self.enumerator = Some(enumerator);
        self
    }
}

/// Method signature as declared by a plugin or native module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,

    /// Script-side name, `Owner.method` for instance-bound methods
    #[serde(rename = "funcName", default)]
    pub func_name: String,

    #[serde(rename = "paramTypes", default)]
    pub params: Vec<PropertyDescriptor>,

    #[serde(rename = "retType")]
    pub ret: PropertyDescriptor,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, params: Vec<PropertyDescriptor>, ret: PropertyDescriptor) -> Self {
        Self {
            name: name.into(),
            func_name: String::new(),
            params,
            ret,
        }
    }

    /// Bind the signature to an owning type (method call shape)
    pub fn with_owner(mut self, owner: &str) -> Self {
        self.func_name = format!("{}.{}", owner, self.name);
        self
    }

    /// Name used to find the callable on the script side
    pub fn script_name(&self) -> &str {
        if self.func_name.is_empty() {
            &self.name
        } else {
            &self.func_name
        }
    }

    /// Owning type name, present for instance-bound methods
    pub fn owner(&self) -> Option<&str> {
        self.script_name()
            .split_once('.')
            .map(|(owner, _)| owner)
            .filter(|owner| !owner.is_empty())
    }

    /// Method name without the owner prefix
    pub fn method_name(&self) -> &str {
        let name = self.script_name();
        name.split_once('.').map_or(name, |(_, method)| method)
    }

    #[inline]
    pub fn is_method(&self) -> bool {
        self.owner().is_some()
    }

    #[inline]
    pub fn ref_count(&self) -> usize {
        self.params.iter().filter(|p| p.by_ref).count()
    }

    /// Check that native entry points can be generated for this signature
    pub fn validate(&self) -> Result<(), JitError> {
        if self.ret.by_ref {
            return Err(JitError::new(format!(
                "'{}': return value cannot be passed by reference",
                self.name
            )));
        }
        self.validate_property(&self.ret, "return")?;

        for (index, param) in self.params.iter().enumerate() {
            if param.kind == ValueKind::Void {
                return Err(JitError::new(format!(
                    "'{}': parameter {} cannot be void",
                    self.name,
                    index + 1
                )));
            }
            self.validate_property(param, "parameter")?;
        }
        Ok(())
    }

    fn validate_property(&self, property: &PropertyDescriptor, role: &str) -> Result<(), JitError> {
        if property.enumerator.is_some() {
            let base = property.kind.element().unwrap_or(property.kind);
            if !base.is_integral() {
                return Err(JitError::new(format!(
                    "'{}': enum {} must be integral, got {}",
                    self.name, role, property.kind
                )));
            }
        }
        if property.kind != ValueKind::Function {
            return Ok(());
        }
        match &property.prototype {
            Some(prototype) => prototype.validate(),
            None => Err(JitError::new(format!(
                "'{}': function {} is missing its prototype",
                self.name, role
            ))),
        }
    }

    /// Enumerations reachable from this signature, prototypes included
    pub fn enums(&self) -> Vec<&EnumDescriptor> {
        let mut found = Vec::new();
        collect_enums(self, &mut found);
        found
    }
}

fn collect_enums<'a>(signature: &'a MethodSignature, found: &mut Vec<&'a EnumDescriptor>) {
    for property in signature.params.iter().chain(std::iter::once(&signature.ret)) {
        if let Some(enumerator) = &property.enumerator {
            found.push(enumerator);
        }
        if let Some(prototype) = &property.prototype {
            collect_enums(prototype, found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(kind: ValueKind) -> PropertyDescriptor {
        PropertyDescriptor::new(kind)
    }

    #[test]
    fn test_kind_names() {
        for kind in ValueKind::ALL {
            assert_eq!(ValueKind::from_name(kind.name()), Some(kind));
            assert_eq!(ValueKind::try_from(kind as u8), Ok(kind));
        }
        assert_eq!(ValueKind::from_name("int128"), None);
        assert_eq!(ValueKind::try_from(200), Err(200));
    }

    #[test]
    fn test_array_kinds() {
        for kind in ValueKind::ALL {
            if let Some(array) = kind.array_of() {
                assert!(array.is_array());
                assert_eq!(array.element(), Some(kind));
            }
        }
        assert_eq!(ValueKind::Any.array_of(), Some(ValueKind::ArrayAny));
        assert_eq!(ValueKind::from_name("any[]"), Some(ValueKind::ArrayAny));
        assert!(ValueKind::ArrayAny.is_passed_by_pointer());
        assert_eq!(ValueKind::Void.array_of(), None);
        assert!(ValueKind::ArrayString.is_hidden_return());
        assert!(!ValueKind::Vector2.is_hidden_return());
    }

    #[test]
    fn test_manifest_serde() {
        let sig: MethodSignature = serde_json::from_str(
            r#"{
                "name": "Tick",
                "funcName": "Plugin.tick",
                "paramTypes": [
                    {"type": "float", "ref": true},
                    {"type": "int32", "enum": {"name": "Mode", "values": [{"name": "Fast", "value": 1}]}}
                ],
                "retType": {"type": "vec3[]"}
            }"#,
        )
        .unwrap();

        assert_eq!(sig.owner(), Some("Plugin"));
        assert_eq!(sig.method_name(), "tick");
        assert!(sig.is_method());
        assert_eq!(sig.ref_count(), 1);
        assert_eq!(sig.ret.kind, ValueKind::ArrayVector3);
        assert_eq!(sig.enums()[0].name, "Mode");
    }

    #[test]
    fn test_plain_function_name() {
        let sig = MethodSignature::new("Add", vec![], prop(ValueKind::Void));
        assert_eq!(sig.script_name(), "Add");
        assert_eq!(sig.owner(), None);
        assert!(!sig.is_method());
    }

    #[test]
    fn test_validate() {
        let void_param = MethodSignature::new("f", vec![prop(ValueKind::Void)], prop(ValueKind::Void));
        assert!(void_param.validate().unwrap_err().message().contains("parameter 1 cannot be void"));

        let ref_return = MethodSignature::new("f", vec![], prop(ValueKind::Int32).by_ref());
        assert!(ref_return.validate().is_err());

        let no_prototype = MethodSignature::new("f", vec![prop(ValueKind::Function)], prop(ValueKind::Void));
        assert!(no_prototype.validate().unwrap_err().message().contains("prototype"));

        let mode = EnumDescriptor { name: "Mode".into(), values: vec![] };
        let float_enum = MethodSignature::new(
            "f",
            vec![prop(ValueKind::Float).with_enum(mode.clone())],
            prop(ValueKind::Void),
        );
        assert!(float_enum.validate().is_err());

        let int_array_enum = MethodSignature::new(
            "f",
            vec![prop(ValueKind::ArrayInt32).with_enum(mode)],
            prop(ValueKind::Void),
        );
        assert!(int_array_enum.validate().is_ok());
    }

    #[test]
    fn test_enums_found_through_prototypes() {
        let level = EnumDescriptor {
            name: "Level".into(),
            values: vec![EnumValue { name: "Low".into(), value: 0 }],
        };
        let callback = MethodSignature::new(
            "cb",
            vec![prop(ValueKind::Int32).with_enum(level)],
            prop(ValueKind::Void),
        );
        let sig = MethodSignature::new(
            "register",
            vec![prop(ValueKind::Function).with_prototype(callback)],
            prop(ValueKind::Void),
        );

        let names: Vec<_> = sig.enums().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Level"]);
    }
}
