// ==============================================================================
// Builtin Metadata
// ==============================================================================
//
// Names bound in the root environment of every Nix file. The `__`-prefixed
// primops are the same values as `builtins.<name>`; they stay in the root
// env so lookups resolve, but completion never surfaces them.

/// Global builtins available without the `builtins.` prefix.
pub const GLOBAL_BUILTINS: &[&str] = &[
    "abort",
    "baseNameOf",
    "builtins",
    "derivation",
    "dirOf",
    "false",
    "fetchGit",
    "fetchMercurial",
    "fetchTarball",
    "fetchTree",
    "fetchurl",
    "fromTOML",
    "import",
    "isNull",
    "map",
    "null",
    "placeholder",
    "removeAttrs",
    "scopedImport",
    "throw",
    "toString",
    "true",
];

/// Internal primop aliases (`__add` is `builtins.add`).
pub const INTERNAL_PRIMOPS: &[&str] = &[
    "__add",
    "__addErrorContext",
    "__all",
    "__any",
    "__attrNames",
    "__attrValues",
    "__catAttrs",
    "__compareVersions",
    "__concatLists",
    "__concatMap",
    "__concatStringsSep",
    "__currentSystem",
    "__currentTime",
    "__deepSeq",
    "__div",
    "__elem",
    "__elemAt",
    "__filter",
    "__filterSource",
    "__foldl'",
    "__fromJSON",
    "__functionArgs",
    "__genList",
    "__getAttr",
    "__getEnv",
    "__hasAttr",
    "__hashString",
    "__head",
    "__intersectAttrs",
    "__isAttrs",
    "__isBool",
    "__isFunction",
    "__isInt",
    "__isList",
    "__isString",
    "__length",
    "__lessThan",
    "__listToAttrs",
    "__mapAttrs",
    "__match",
    "__mul",
    "__nixPath",
    "__nixVersion",
    "__parseDrvName",
    "__partition",
    "__pathExists",
    "__readDir",
    "__readFile",
    "__replaceStrings",
    "__seq",
    "__sort",
    "__split",
    "__storeDir",
    "__storePath",
    "__stringLength",
    "__sub",
    "__substring",
    "__tail",
    "__toFile",
    "__toJSON",
    "__toPath",
    "__toXML",
    "__trace",
    "__tryEval",
    "__typeOf",
];

/// Returns the static name string if `name` is bound in the root env.
pub fn lookup_builtin(name: &str) -> Option<&'static str> {
    GLOBAL_BUILTINS
        .iter()
        .chain(INTERNAL_PRIMOPS)
        .find(|b| **b == name)
        .copied()
}

/// All root-env names, global builtins first.
pub fn all_builtins() -> impl Iterator<Item = &'static str> {
    GLOBAL_BUILTINS.iter().chain(INTERNAL_PRIMOPS).copied()
}
