use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

/// A document type that can be persisted as a structure.
///
/// Implemented by the [`structure!`](crate::structure) macro; the descriptor
/// is the static replacement for runtime property reflection and is built
/// once per type.
pub trait Structure: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn type_descriptor() -> &'static TypeDescriptor;
}

/// Maps a Rust field type to its place in a structure's type graph.
pub trait Describe {
    fn describe() -> ValueDescriptor;
}

/// The scalar kinds a leaf property can project as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int,
    Float,
    Bool,
    Text,
    DateTime,
    Guid,
}

/// The value shape of one declared field.
///
/// Nested object descriptors are reached through a function pointer so that
/// cyclic type graphs can be *described* (and then rejected at schema build)
/// without recursing at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDescriptor {
    Scalar(ScalarKind),
    Enumeration,
    ScalarCollection(ScalarKind),
    Object(fn() -> &'static TypeDescriptor),
    ObjectCollection(fn() -> &'static TypeDescriptor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: &'static str,
    kind: ValueDescriptor,
    unique: bool,
}

impl FieldDescriptor {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ValueDescriptor {
        self.kind
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

/// The static description of one document type: its name and its declared
/// fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    name: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &'static str, kind: ValueDescriptor) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind,
            unique: false,
        });
        self
    }

    /// Declares a field whose indexable path carries a unique constraint.
    pub fn unique_field(mut self, name: &'static str, kind: ValueDescriptor) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind,
            unique: true,
        });
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

macro_rules! describe_scalar {
    ($kind:expr => $($ty:ty),+ $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe() -> ValueDescriptor {
                    ValueDescriptor::Scalar($kind)
                }
            }
        )+
    };
}

describe_scalar!(ScalarKind::Int => i8, i16, i32, i64, u8, u16, u32);
describe_scalar!(ScalarKind::Float => f32, f64);
describe_scalar!(ScalarKind::Bool => bool);
describe_scalar!(ScalarKind::Text => String);
describe_scalar!(ScalarKind::Guid => Uuid);
describe_scalar!(ScalarKind::DateTime => DateTime<Utc>);

impl<T: Describe> Describe for Option<T> {
    fn describe() -> ValueDescriptor {
        T::describe()
    }
}

impl<T: Describe> Describe for Box<T> {
    fn describe() -> ValueDescriptor {
        T::describe()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> ValueDescriptor {
        match T::describe() {
            ValueDescriptor::Scalar(kind) => ValueDescriptor::ScalarCollection(kind),
            ValueDescriptor::Enumeration => ValueDescriptor::ScalarCollection(ScalarKind::Text),
            ValueDescriptor::ScalarCollection(kind) => ValueDescriptor::ScalarCollection(kind),
            ValueDescriptor::Object(descriptor) | ValueDescriptor::ObjectCollection(descriptor) => {
                ValueDescriptor::ObjectCollection(descriptor)
            }
        }
    }
}

/// Defines a document type together with its static descriptor.
///
/// ```rust,ignore
/// strukt_store::structure! {
///     pub struct Customer {
///         pub customer_id: i64,
///         pub name: String,
///         pub shipping: Address,
///     }
/// }
/// ```
///
/// The struct gets serde derives and an implementation of
/// [`Structure`](crate::schema::Structure); field kinds are inferred from the
/// field types through [`Describe`](crate::schema::Describe).
#[macro_export]
macro_rules! structure {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $fname:ident : $fty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(::serde::Serialize, ::serde::Deserialize)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $fname : $fty,
            )*
        }

        impl $crate::schema::Describe for $name {
            fn describe() -> $crate::schema::ValueDescriptor {
                $crate::schema::ValueDescriptor::Object(
                    <$name as $crate::schema::Structure>::type_descriptor,
                )
            }
        }

        impl $crate::schema::Structure for $name {
            fn type_descriptor() -> &'static $crate::schema::TypeDescriptor {
                static DESCRIPTOR: ::std::sync::OnceLock<$crate::schema::TypeDescriptor> =
                    ::std::sync::OnceLock::new();

                DESCRIPTOR.get_or_init(|| {
                    $crate::schema::TypeDescriptor::new(stringify!($name))
                        $(.field(
                            stringify!($fname),
                            <$fty as $crate::schema::Describe>::describe(),
                        ))*
                })
            }
        }
    };
}

/// Marks an enum as an enumeration leaf in a type graph.
#[macro_export]
macro_rules! enumeration {
    ($($name:ty),+ $(,)?) => {
        $(
            impl $crate::schema::Describe for $name {
                fn describe() -> $crate::schema::ValueDescriptor {
                    $crate::schema::ValueDescriptor::Enumeration
                }
            }
        )+
    };
}
