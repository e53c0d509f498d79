use std::fs;
use std::path::Path;
use std::rc::Rc;

use lualink::{
    LanguageModule, MethodSignature, ModuleConfig, ModuleError, PluginDescriptor,
    PropertyDescriptor, StaticHost, ValueKind,
};

const PLUGIN_SOURCE: &str = r#"
local Plugin = {}
Plugin.__index = Plugin

function Plugin.new(cls, id, name, description, version, author, website, license, location, deps)
    local self = setmetatable({}, cls)
    self.id = id
    self.name = name
    self.deps = deps
    self.ticks = 0
    self.elapsed = 0
    return self
end

function Plugin:plugin_start()
    started = self.name
end

function Plugin:plugin_update(dt)
    self.ticks = self.ticks + 1
    self.elapsed = self.elapsed + dt
    ticks = self.ticks
end

function Plugin:plugin_end()
    error("failing on purpose")
end

function Plugin:scale(x)
    return x * self.id
end

local function double(x)
    return x * 2
end

return { Plugin = Plugin, double = double }
"#;

fn write_plugin(dir: &Path, source: &str) {
    let scripts = dir.join("scripts");
    fs::create_dir_all(&scripts).unwrap();
    fs::write(scripts.join("main.lua"), source).unwrap();
}

fn int() -> PropertyDescriptor {
    PropertyDescriptor::new(ValueKind::Int32)
}

fn descriptor(dir: &Path, methods: Vec<MethodSignature>) -> PluginDescriptor {
    PluginDescriptor {
        id: 3,
        name: "demo".to_string(),
        description: "test plugin".to_string(),
        version: "1.0".to_string(),
        author: String::new(),
        website: String::new(),
        license: "MIT".to_string(),
        location: dir.to_path_buf(),
        entry_point: "scripts.main.Plugin".to_string(),
        dependencies: vec!["core".to_string()],
        methods,
    }
}

fn function(name: &str, script_name: &str) -> MethodSignature {
    let mut signature = MethodSignature::new(name, vec![int()], int());
    signature.func_name = script_name.to_string();
    signature
}

fn module() -> LanguageModule {
    LanguageModule::initialize(ModuleConfig::default(), Rc::new(StaticHost::new())).unwrap()
}

#[test]
fn test_load_and_export_methods() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), PLUGIN_SOURCE);
    let module = module();

    let methods = vec![
        function("Double", "double"),
        MethodSignature::new("scale", vec![int()], int()).with_owner("Plugin"),
    ];
    let loaded = module.load_plugin(&descriptor(dir.path(), methods)).unwrap();

    assert_eq!(loaded.id, 3);
    assert!(loaded.has_start && loaded.has_update && loaded.has_end);
    assert_eq!(loaded.methods.len(), 2);

    let double: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(loaded.methods[0].address) };
    let scale: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(loaded.methods[1].address) };
    assert_eq!(double(21), 42);
    assert_eq!(scale(5), 15);
}

#[test]
fn test_lifecycle_hooks() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), PLUGIN_SOURCE);
    let module = module();
    module.load_plugin(&descriptor(dir.path(), vec![])).unwrap();

    module.start_plugin(3).unwrap();
    let started: String = module.lua().globals().get("started").unwrap();
    assert_eq!(started, "demo");

    module.update_plugin(3, 0.25).unwrap();
    module.update_plugin(3, 0.25).unwrap();
    let ticks: i64 = module.lua().globals().get("ticks").unwrap();
    assert_eq!(ticks, 2);

    // plugin_end raises; the error is logged, not returned
    module.end_plugin(3).unwrap();
    assert!(!module.is_loaded(3));
    assert!(matches!(module.update_plugin(3, 0.1), Err(ModuleError::PluginNotFound(3))));
}

#[test]
fn test_module_table_registered() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), PLUGIN_SOURCE);
    let module = module();
    module.load_plugin(&descriptor(dir.path(), vec![])).unwrap();

    let check: bool = module
        .lua()
        .load(r#"
            local main = require("scripts.main")
            return main.Plugin ~= nil and type(main.double) == "function"
        "#)
        .eval()
        .unwrap();
    assert!(check);
}

#[test]
fn test_duplicate_plugin() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), PLUGIN_SOURCE);
    let module = module();
    let plugin = descriptor(dir.path(), vec![]);

    module.load_plugin(&plugin).unwrap();
    assert!(matches!(module.load_plugin(&plugin), Err(ModuleError::DuplicatePlugin(3))));
}

#[test]
fn test_missing_methods_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), PLUGIN_SOURCE);
    let module = module();

    let methods = vec![function("Double", "double"), function("Missing", "missing")];
    let err = module.load_plugin(&descriptor(dir.path(), methods)).unwrap_err();

    let ModuleError::InvalidMethods(lines) = err else { panic!("expected invalid methods") };
    assert_eq!(lines, vec!["  1. Missing not found 'missing' in module".to_string()]);
}

#[test]
fn test_failed_load_releases_bindings() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), PLUGIN_SOURCE);
    let module = module();
    let before = module.context().cached_bindings();

    let methods = vec![
        function("Double", "double"),
        MethodSignature::new("scale", vec![int()], int()).with_owner("Plugin"),
        function("Missing", "missing"),
    ];
    assert!(module.load_plugin(&descriptor(dir.path(), methods)).is_err());
    assert_eq!(module.context().cached_bindings(), before);
    assert!(!module.is_loaded(3));

    let loaded = module
        .load_plugin(&descriptor(dir.path(), vec![function("Double", "double")]))
        .unwrap();
    let double: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(loaded.methods[0].address) };
    assert_eq!(double(4), 8);
}

#[test]
fn test_end_plugin_releases_bindings() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), PLUGIN_SOURCE);
    let module = module();
    let before = module.context().cached_bindings();

    let methods = vec![
        function("Double", "double"),
        MethodSignature::new("scale", vec![int()], int()).with_owner("Plugin"),
    ];
    module.load_plugin(&descriptor(dir.path(), methods)).unwrap();
    assert_eq!(module.context().cached_bindings(), before + 2);

    module.end_plugin(3).unwrap();
    assert_eq!(module.context().cached_bindings(), before);
}

#[test]
fn test_method_errors_are_capped() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), PLUGIN_SOURCE);
    let config = ModuleConfig {
        max_export_errors: 2,
        ..ModuleConfig::default()
    };
    let module = LanguageModule::initialize(config, Rc::new(StaticHost::new())).unwrap();

    let methods = (0..5).map(|i| function(&format!("M{}", i), &format!("m{}", i))).collect();
    let err = module.load_plugin(&descriptor(dir.path(), methods)).unwrap_err();

    let ModuleError::InvalidMethods(lines) = err else { panic!("expected invalid methods") };
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2], "... and 3 more");
}

#[test]
fn test_load_failures() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), PLUGIN_SOURCE);
    let module = module();

    let mut plugin = descriptor(dir.path(), vec![]);
    plugin.entry_point = "scripts.other.Plugin".to_string();
    assert!(matches!(module.load_plugin(&plugin), Err(ModuleError::FileNotFound(_))));

    plugin.entry_point = "scripts.main.Nope".to_string();
    assert!(matches!(module.load_plugin(&plugin), Err(ModuleError::MissingClass { .. })));

    plugin.entry_point = "scripts/main.Plugin".to_string();
    assert!(matches!(module.load_plugin(&plugin), Err(ModuleError::InvalidEntryPoint { .. })));
}

#[test]
fn test_constructor_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(
        dir.path(),
        r#"
        local Plugin = {}
        function Plugin.new() error("cannot build") end
        return { Plugin = Plugin }
        "#,
    );
    let module = module();

    let err = module.load_plugin(&descriptor(dir.path(), vec![])).unwrap_err();
    let ModuleError::Constructor { message, .. } = err else { panic!("expected constructor error") };
    assert!(message.contains("cannot build"));
}

#[test]
fn test_lib_dir_modules_are_requirable() {
    let lib = tempfile::tempdir().unwrap();
    fs::write(lib.path().join("helper.lua"), "return { answer = 42 }").unwrap();
    fs::write(lib.path().join("notes.txt"), "ignored").unwrap();

    let config = ModuleConfig::default().with_lib_dir(lib.path());
    let module = LanguageModule::initialize(config, Rc::new(StaticHost::new())).unwrap();

    let answer: i64 = module.lua().load(r#"return require("helper").answer"#).eval().unwrap();
    assert_eq!(answer, 42);
}

#[test]
fn test_descriptor_from_file() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), PLUGIN_SOURCE);
    let manifest = dir.path().join("demo.json");
    fs::write(
        &manifest,
        format!(
            r#"{{
                "id": 3,
                "name": "demo",
                "location": {:?},
                "entryPoint": "scripts.main.Plugin",
                "exportedMethods": [
                    {{ "name": "Double", "funcName": "double",
                       "paramTypes": [{{ "type": "int32" }}], "retType": {{ "type": "int32" }} }}
                ]
            }}"#,
            dir.path().display().to_string()
        ),
    )
    .unwrap();

    let plugin = PluginDescriptor::from_file(&manifest).unwrap();
    let loaded = module().load_plugin(&plugin).unwrap();
    assert_eq!(loaded.methods[0].name, "Double");
}
