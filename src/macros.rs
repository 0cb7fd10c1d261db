//! Declaration macros.
//!
//! [`record!`](crate::record) declares a struct and wires it into both
//! engines. Field annotations use the Go struct tag layout:
//!
//! ```
//! dynamo_mapper::record! {
//!     #[derive(Debug, Default, PartialEq)]
//!     pub struct Hit {
//!         #[tag = r#"dynamo:"UserID,hash""#]
//!         pub user: i64,
//!         #[tag = r#"dynamo:",range" index:"Seq-index,hash""#]
//!         pub seq: i64,
//!         #[tag = r#"dynamo:",omitempty""#]
//!         pub bonus: Option<i64>,
//!         scratch: String,
//!     }
//! }
//! ```
//!
//! Fields without `pub` are unexported: the engines never read or write
//! them. `#[embed]` splices a struct (or an `Option` of one) into its parent.
//! Any other field attribute, doc comments included, is kept on the field.

/// Declare a struct that marshals to and from DynamoDB items.
///
/// Every field type must implement [`Marshal`](crate::Marshal) and
/// [`Unmarshal`](crate::Unmarshal).
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $svis:vis struct $name:ident {
            $(
                $(#[$($attr:tt)*])*
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $crate::__record_struct! {
            [$(#[$meta])* $svis struct $name]
            []
            $( { [$([$($attr)*])*] [$fvis] $field [$ty] } )*
        }

        impl $name {
            #[doc(hidden)]
            const __DYNAMO_FIELDS: &'static [$crate::FieldSpec] = &[
                $(
                    $crate::__field_spec!(
                        $crate::FieldSpec::new(stringify!($field), !stringify!($fvis).is_empty());
                        $([$($attr)*])*
                    )
                ),*
            ];
        }

        impl $crate::Record for $name {
            fn fields(&self) -> ::std::vec::Vec<$crate::Field<'_>> {
                let values: ::std::vec::Vec<&dyn $crate::Marshal> =
                    ::std::vec![$( &self.$field as &dyn $crate::Marshal ),*];
                Self::__DYNAMO_FIELDS
                    .iter()
                    .zip(values)
                    .map(|(spec, value)| $crate::Field::new(*spec, value))
                    .collect()
            }
        }

        impl $crate::RecordMut for $name {
            fn fields_mut(&mut self) -> ::std::vec::Vec<$crate::FieldMut<'_>> {
                let values: ::std::vec::Vec<&mut dyn $crate::Unmarshal> =
                    ::std::vec![$( &mut self.$field as &mut dyn $crate::Unmarshal ),*];
                Self::__DYNAMO_FIELDS
                    .iter()
                    .zip(values)
                    .map(|(spec, value)| $crate::FieldMut::new(*spec, value))
                    .collect()
            }
        }

        impl $crate::Marshal for $name {
            fn kind() -> $crate::Kind {
                $crate::Kind::Struct
            }

            fn repr(&self) -> $crate::Repr<'_> {
                $crate::Repr::Struct(self)
            }
        }

        impl $crate::Unmarshal for $name {
            fn unmarshal(&mut self, av: &$crate::AttributeValue) -> $crate::Result<()> {
                $crate::unmarshal::unmarshal_struct(self, av)
            }

            fn unmarshal_item(&mut self, item: &$crate::Item) -> $crate::Result<()> {
                $crate::unmarshal::unmarshal_record(self, item)
            }

            fn embedded(&mut self) -> ::std::option::Option<&mut dyn $crate::RecordMut> {
                ::std::option::Option::Some(self)
            }

            fn embedded_names(&self) -> ::std::vec::Vec<::std::string::String> {
                let values: ::std::vec::Vec<&dyn $crate::Unmarshal> =
                    ::std::vec![$( &self.$field as &dyn $crate::Unmarshal ),*];
                $crate::unmarshal::flattened_names(Self::__DYNAMO_FIELDS, &values)
            }
        }
    };
}

/// Emits a `record!` struct with the `tag` and `embed` attributes removed
/// from its fields. Every other field attribute is kept.
#[doc(hidden)]
#[macro_export]
macro_rules! __record_struct {
    (@attrs $head:tt $done:tt [$($keep:tt)*] [[tag = $($val:tt)*] $($attrs:tt)*] $($rest:tt)*) => {
        $crate::__record_struct!{@attrs $head $done [$($keep)*] [$($attrs)*] $($rest)*}
    };
    (@attrs $head:tt $done:tt [$($keep:tt)*] [[embed] $($attrs:tt)*] $($rest:tt)*) => {
        $crate::__record_struct!{@attrs $head $done [$($keep)*] [$($attrs)*] $($rest)*}
    };
    (@attrs $head:tt $done:tt [$($keep:tt)*] [[$($attr:tt)*] $($attrs:tt)*] $($rest:tt)*) => {
        $crate::__record_struct!{@attrs $head $done [$($keep)* #[$($attr)*]] [$($attrs)*] $($rest)*}
    };
    (@attrs $head:tt [$($done:tt)*] [$($keep:tt)*] [] [$($vis:tt)*] $field:ident [$($ty:tt)*] $($rest:tt)*) => {
        $crate::__record_struct!{$head [$($done)* $($keep)* $($vis)* $field: $($ty)*,] $($rest)*}
    };
    ([$($head:tt)*] [$($done:tt)*]) => {
        $($head)* {
            $($done)*
        }
    };
    ($head:tt $done:tt { [$($attrs:tt)*] $vis:tt $field:ident $ty:tt } $($rest:tt)*) => {
        $crate::__record_struct!{@attrs $head $done [] [$($attrs)*] $vis $field $ty $($rest)*}
    };
}

/// Folds the `tag` and `embed` attributes of one field into its
/// [`FieldSpec`](crate::FieldSpec).
#[doc(hidden)]
#[macro_export]
macro_rules! __field_spec {
    ($spec:expr;) => {
        $spec
    };
    ($spec:expr; [tag = $val:expr] $($rest:tt)*) => {
        $crate::__field_spec!($spec.tag($val); $($rest)*)
    };
    ($spec:expr; [embed] $($rest:tt)*) => {
        $crate::__field_spec!($spec.embed(); $($rest)*)
    };
    ($spec:expr; [$($other:tt)*] $($rest:tt)*) => {
        $crate::__field_spec!($spec; $($rest)*)
    };
}

/// Implement both engines for a type with its own [`Marshaler`](crate::Marshaler)
/// and [`Unmarshaler`](crate::Unmarshaler).
#[macro_export]
macro_rules! marshaler {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Marshal for $ty {
                fn kind() -> $crate::Kind {
                    $crate::Kind::Marshaler
                }

                fn repr(&self) -> $crate::Repr<'_> {
                    $crate::Repr::Marshaler(self)
                }
            }

            impl $crate::Unmarshal for $ty {
                fn unmarshal(&mut self, av: &$crate::AttributeValue) -> $crate::Result<()> {
                    $crate::Unmarshaler::unmarshal_dynamo(self, av)
                }
            }
        )+
    };
}

/// Implement both engines for a type stored as text through
/// [`TextMarshaler`](crate::TextMarshaler) and
/// [`TextUnmarshaler`](crate::TextUnmarshaler).
#[macro_export]
macro_rules! text_marshaler {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Marshal for $ty {
                fn kind() -> $crate::Kind {
                    $crate::Kind::TextMarshaler
                }

                fn repr(&self) -> $crate::Repr<'_> {
                    $crate::Repr::TextMarshaler(self)
                }
            }

            impl $crate::Unmarshal for $ty {
                fn unmarshal(&mut self, av: &$crate::AttributeValue) -> $crate::Result<()> {
                    $crate::unmarshal::unmarshal_text(self, av)
                }
            }
        )+
    };
}
