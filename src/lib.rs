//! lualink - Lua language bridge for a native plugin host
//!
//! Native code calls Lua functions through generated entry points, Lua calls
//! native functions through generated script functions, and values of a
//! fixed kind taxonomy are converted both ways.

pub mod config;
pub mod context;
pub mod interop;
pub mod logging;
pub mod module;

// Re-export commonly used items
pub use config::{LogSettings, ModuleConfig};
pub use context::{ContextError, ScriptContext, STRUCT_MODULE};
pub use interop::{
    CallError, ConversionError, EnumDescriptor, EnumValue, InteropStats, JitError, Matrix4x4,
    MethodSignature, NativeValue, PropertyDescriptor, ValueKind, Vector2, Vector3, Vector4,
};
pub use module::{
    Host, LanguageModule, LoadedPlugin, ModuleError, NativeModule, PluginDescriptor, StaticHost,
};
