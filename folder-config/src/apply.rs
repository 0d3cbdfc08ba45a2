//! Structural copy of settings between unrelated types.
//!
//! A configuration section and the target it is projected onto are
//! different Rust types that happen to share member names. Both expose a
//! static schema through [`Reflect`]; [`apply`] copies every member that
//! exists on both sides with exactly the same declared type, writing only
//! leaves whose value differs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::trace;

/// Declared type of a reflected member.
///
/// Types are compared exactly: an `i32` member never matches an `i64`
/// member, and enums and groups must carry the same type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    String,
    /// A fieldless enum, identified by its type name.
    Enum(&'static str),
    /// A nested settings group, identified by its type name.
    Group(&'static str),
}

impl FieldType {
    /// Whether values of this type are compared and copied directly.
    pub fn is_leaf(self) -> bool {
        !matches!(self, Self::Group(_))
    }
}

/// Name and declared type of one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub ty: FieldType,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }
}

/// A leaf value read from or written to a reflected member.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Enum {
        ty: &'static str,
        variant: &'static str,
    },
}

impl Value {
    /// The declared type this value belongs to.
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Bool(_) => FieldType::Bool,
            Self::I32(_) => FieldType::I32,
            Self::I64(_) => FieldType::I64,
            Self::U32(_) => FieldType::U32,
            Self::U64(_) => FieldType::U64,
            Self::F32(_) => FieldType::F32,
            Self::F64(_) => FieldType::F64,
            Self::String(_) => FieldType::String,
            Self::Enum { ty, .. } => FieldType::Enum(ty),
        }
    }
}

// NaN equals NaN here, otherwise a NaN member would be rewritten on every
// apply and never settle.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::F64(a), Self::F64(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (
                Self::Enum { ty: a, variant: x },
                Self::Enum { ty: b, variant: y },
            ) => a == b && x == y,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Enum { ty, variant } => write!(f, "{ty}::{variant}"),
        }
    }
}

/// A Rust type usable as a leaf member.
pub trait Leaf: Sized {
    const FIELD_TYPE: FieldType;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! primitive_leaf {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Leaf for $ty {
                const FIELD_TYPE: FieldType = FieldType::$variant;

                fn to_value(&self) -> Value {
                    Value::$variant(*self)
                }

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

primitive_leaf!(
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);

impl Leaf for String {
    const FIELD_TYPE: FieldType = FieldType::String;

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(v) => Some(v),
            _ => None,
        }
    }
}

/// Named member access for configuration sections and targets.
///
/// Implement it with the [`reflect!`](crate::reflect) macro unless the type
/// needs custom accessors (for example a target that forwards to an
/// external API).
pub trait Reflect {
    /// Declared type name, compared when matching nested groups.
    fn type_name(&self) -> &'static str;

    /// Static schema of this type's members.
    fn fields(&self) -> &'static [FieldDescriptor];

    /// Read a leaf member.
    fn value(&self, name: &str) -> Option<Value>;

    /// Write a leaf member. Returns `false` if there is no such member or
    /// the value has the wrong type.
    fn set_value(&mut self, name: &str, value: Value) -> bool;

    /// Borrow a nested group.
    fn group(&self, _name: &str) -> Option<&dyn Reflect> {
        None
    }

    /// Mutably borrow a nested group.
    fn group_mut(&mut self, _name: &str) -> Option<&mut dyn Reflect> {
        None
    }
}

/// Implements [`Reflect`] for a struct from its member list.
///
/// ```ignore
/// reflect! {
///     TextureSettings {
///         max_size: i32,
///         readable: bool,
///     }
///     groups {
///         android: PlatformSettings,
///     }
/// }
/// ```
#[macro_export]
macro_rules! reflect {
    (
        $ty:ident {
            $( $field:ident : $field_ty:ty ),* $(,)?
        }
        $( groups { $( $group:ident : $group_ty:ident ),* $(,)? } )?
    ) => {
        impl $crate::apply::Reflect for $ty {
            fn type_name(&self) -> &'static str {
                stringify!($ty)
            }

            fn fields(&self) -> &'static [$crate::apply::FieldDescriptor] {
                static FIELDS: &[$crate::apply::FieldDescriptor] = &[
                    $(
                        $crate::apply::FieldDescriptor::new(
                            stringify!($field),
                            <$field_ty as $crate::apply::Leaf>::FIELD_TYPE,
                        ),
                    )*
                    $($(
                        $crate::apply::FieldDescriptor::new(
                            stringify!($group),
                            $crate::apply::FieldType::Group(stringify!($group_ty)),
                        ),
                    )*)?
                ];
                FIELDS
            }

            #[allow(unused_variables)]
            fn value(&self, name: &str) -> Option<$crate::apply::Value> {
                $(
                    if name == stringify!($field) {
                        return Some(<$field_ty as $crate::apply::Leaf>::to_value(&self.$field));
                    }
                )*
                None
            }

            #[allow(unused_variables)]
            fn set_value(&mut self, name: &str, value: $crate::apply::Value) -> bool {
                $(
                    if name == stringify!($field) {
                        return match <$field_ty as $crate::apply::Leaf>::from_value(value) {
                            Some(v) => {
                                self.$field = v;
                                true
                            }
                            None => false,
                        };
                    }
                )*
                false
            }

            #[allow(unused_variables)]
            fn group(&self, name: &str) -> Option<&dyn $crate::apply::Reflect> {
                $($(
                    if name == stringify!($group) {
                        return Some(&self.$group);
                    }
                )*)?
                None
            }

            #[allow(unused_variables)]
            fn group_mut(&mut self, name: &str) -> Option<&mut dyn $crate::apply::Reflect> {
                $($(
                    if name == stringify!($group) {
                        return Some(&mut self.$group);
                    }
                )*)?
                None
            }
        }
    };
}

/// Implements [`Leaf`] for a fieldless enum, keyed by variant name.
#[macro_export]
macro_rules! leaf_enum {
    ($ty:ident { $( $variant:ident ),+ $(,)? }) => {
        impl $crate::apply::Leaf for $ty {
            const FIELD_TYPE: $crate::apply::FieldType =
                $crate::apply::FieldType::Enum(stringify!($ty));

            fn to_value(&self) -> $crate::apply::Value {
                let variant = match self {
                    $( Self::$variant => stringify!($variant), )+
                };
                $crate::apply::Value::Enum {
                    ty: stringify!($ty),
                    variant,
                }
            }

            fn from_value(value: $crate::apply::Value) -> Option<Self> {
                match value {
                    $crate::apply::Value::Enum { ty, variant } if ty == stringify!($ty) => {
                        $(
                            if variant == stringify!($variant) {
                                return Some(Self::$variant);
                            }
                        )+
                        None
                    }
                    _ => None,
                }
            }
        }
    };
}

/// Schemas are `'static`, so a plan is identified by where both live.
type PlanKey = ((usize, usize), (usize, usize));

static PLANS: Lazy<Mutex<HashMap<PlanKey, Arc<FieldPlan>>>> = Lazy::new(Mutex::default);

fn schema_key(fields: &'static [FieldDescriptor]) -> (usize, usize) {
    (fields.as_ptr() as usize, fields.len())
}

/// Members shared by a source and a target type, same name and same
/// declared type, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPlan {
    matched: Vec<FieldDescriptor>,
}

impl FieldPlan {
    /// Match two schemas.
    pub fn between(source: &[FieldDescriptor], target: &[FieldDescriptor]) -> Self {
        let matched = source
            .iter()
            .filter(|field| match target.iter().find(|t| t.name == field.name) {
                Some(t) if t.ty == field.ty => true,
                Some(t) => {
                    trace!(
                        field = field.name,
                        source = ?field.ty,
                        target = ?t.ty,
                        "member type differs, skipping"
                    );
                    false
                }
                None => {
                    trace!(field = field.name, "member missing on target, skipping");
                    false
                }
            })
            .copied()
            .collect();

        Self { matched }
    }

    /// The plan for a pair of schemas, matched on first use and shared
    /// afterwards.
    pub fn cached(
        source: &'static [FieldDescriptor],
        target: &'static [FieldDescriptor],
    ) -> Arc<Self> {
        let key = (schema_key(source), schema_key(target));
        let Ok(mut plans) = PLANS.lock() else {
            return Arc::new(Self::between(source, target));
        };
        plans
            .entry(key)
            .or_insert_with(|| Arc::new(Self::between(source, target)))
            .clone()
    }

    /// The matched members.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.matched
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }
}

/// Copy every matching member of `source` onto `target`.
///
/// Returns `true` iff at least one leaf on the target was rewritten. Safe
/// to call redundantly: a second call with unchanged inputs returns `false`
/// and performs no writes.
pub fn apply(source: &dyn Reflect, target: &mut dyn Reflect) -> bool {
    let plan = FieldPlan::cached(source.fields(), target.fields());
    let mut changed = false;

    for field in plan.fields() {
        if field.ty.is_leaf() {
            changed |= apply_leaf(source, target, field.name);
        } else if let (Some(nested_source), Some(nested_target)) =
            (source.group(field.name), target.group_mut(field.name))
        {
            changed |= apply(nested_source, nested_target);
        }
    }

    changed
}

fn apply_leaf(source: &dyn Reflect, target: &mut dyn Reflect, name: &str) -> bool {
    let Some(wanted) = source.value(name) else {
        return false;
    };
    let current = target.value(name);
    if current.as_ref() == Some(&wanted) {
        return false;
    }

    trace!(field = name, value = %wanted, "writing member");
    target.set_value(name, wanted)
}

/// Dotted paths of the leaves [`apply`] would rewrite, without writing.
pub fn diff(source: &dyn Reflect, target: &dyn Reflect) -> Vec<String> {
    let mut out = Vec::new();
    collect_diff(source, target, "", &mut out);
    out
}

fn collect_diff(source: &dyn Reflect, target: &dyn Reflect, prefix: &str, out: &mut Vec<String>) {
    let plan = FieldPlan::cached(source.fields(), target.fields());

    for field in plan.fields() {
        let path = format!("{prefix}{}", field.name);
        if field.ty.is_leaf() {
            if source.value(field.name) != target.value(field.name) {
                out.push(path);
            }
        } else if let (Some(nested_source), Some(nested_target)) =
            (source.group(field.name), target.group(field.name))
        {
            collect_diff(nested_source, nested_target, &format!("{path}."), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FilterMode {
        Point,
        Bilinear,
    }

    crate::leaf_enum!(FilterMode { Point, Bilinear });

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Compression {
        Off,
        Bilinear,
    }

    crate::leaf_enum!(Compression { Off, Bilinear });

    #[derive(Debug, Clone, PartialEq)]
    struct Platform {
        format: String,
        quality: u32,
    }

    crate::reflect!(Platform {
        format: String,
        quality: u32,
    });

    #[derive(Debug, Clone, PartialEq)]
    struct OtherPlatform {
        format: String,
        quality: u32,
    }

    crate::reflect!(OtherPlatform {
        format: String,
        quality: u32,
    });

    #[derive(Debug, Clone, PartialEq)]
    struct TextureSection {
        size: i32,
        readable: bool,
        filter: FilterMode,
        label: i64,
        platform: Platform,
        fallback: Platform,
    }

    crate::reflect! {
        TextureSection {
            size: i32,
            readable: bool,
            filter: FilterMode,
            label: i64,
        }
        groups {
            platform: Platform,
            fallback: Platform,
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct TextureTarget {
        size: i32,
        readable: bool,
        gamma: f32,
        filter: Compression,
        label: String,
        platform: Platform,
        fallback: OtherPlatform,
    }

    crate::reflect! {
        TextureTarget {
            size: i32,
            readable: bool,
            gamma: f32,
            filter: Compression,
            label: String,
        }
        groups {
            platform: Platform,
            fallback: OtherPlatform,
        }
    }

    fn platform(format: &str, quality: u32) -> Platform {
        Platform {
            format: format.to_string(),
            quality,
        }
    }

    fn section() -> TextureSection {
        TextureSection {
            size: 512,
            readable: false,
            filter: FilterMode::Bilinear,
            label: 7,
            platform: platform("astc", 50),
            fallback: platform("etc2", 10),
        }
    }

    fn target() -> TextureTarget {
        TextureTarget {
            size: 256,
            readable: false,
            gamma: 1.0,
            filter: Compression::Off,
            label: "keep".to_string(),
            platform: platform("astc", 50),
            fallback: OtherPlatform {
                format: "dxt".to_string(),
                quality: 1,
            },
        }
    }

    #[test]
    fn test_apply_writes_changed_leaf() {
        let source = section();
        let mut target = target();

        assert!(apply(&source, &mut target));
        assert_eq!(target.size, 512);
        assert!(!target.readable);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let source = section();
        let mut target = target();

        assert!(apply(&source, &mut target));
        assert!(!apply(&source, &mut target));
    }

    #[test]
    fn test_target_only_member_untouched() {
        let source = section();
        let mut target = target();

        apply(&source, &mut target);
        assert_eq!(target.gamma, 1.0);
    }

    #[test]
    fn test_type_mismatch_is_skipped() {
        let source = section();
        let mut target = target();

        apply(&source, &mut target);
        // i64 vs String
        assert_eq!(target.label, "keep");
        // enums of different types, even with a shared variant name
        assert_eq!(target.filter, Compression::Off);
        // same member name, different group type
        assert_eq!(target.fallback.format, "dxt");
    }

    #[test]
    fn test_nested_group_recurses() {
        let mut source = section();
        source.platform.quality = 90;
        let mut target = target();
        target.size = 512;

        assert!(apply(&source, &mut target));
        assert_eq!(target.platform, platform("astc", 90));
    }

    #[test]
    fn test_equal_values_report_unchanged() {
        let source = section();
        let mut target = target();
        target.size = 512;

        assert!(!apply(&source, &mut target));
    }

    #[test]
    fn test_plan_matches_name_and_type() {
        let plan = FieldPlan::between(section().fields(), target().fields());
        let names: Vec<&str> = plan.fields().iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["size", "readable", "platform"]);
    }

    #[test]
    fn test_plan_is_shared_per_type_pair() {
        let first = FieldPlan::cached(section().fields(), target().fields());
        let second = FieldPlan::cached(section().fields(), target().fields());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            *first,
            FieldPlan::between(section().fields(), target().fields())
        );

        let nested = FieldPlan::cached(platform("astc", 90).fields(), target().fields());
        assert!(!Arc::ptr_eq(&first, &nested));
    }

    #[test]
    fn test_diff_lists_pending_writes() {
        let mut source = section();
        source.platform.format = "pvrtc".to_string();
        let target = target();

        assert_eq!(diff(&source, &target), vec!["size", "platform.format"]);
    }

    #[test]
    fn test_nan_settles() {
        #[derive(Debug)]
        struct Curve {
            bias: f64,
        }
        crate::reflect!(Curve { bias: f64 });

        let source = Curve { bias: f64::NAN };
        let mut target = Curve { bias: 0.0 };

        assert!(apply(&source, &mut target));
        assert!(target.bias.is_nan());
        assert!(!apply(&source, &mut target));
    }

    #[test]
    fn test_enum_round_trip_through_value() {
        let value = FilterMode::Point.to_value();
        assert_eq!(value.field_type(), FieldType::Enum("FilterMode"));
        assert_eq!(FilterMode::from_value(value), Some(FilterMode::Point));
        assert_eq!(
            Compression::from_value(FilterMode::Bilinear.to_value()),
            None
        );
    }
}
