macro_rules! quantity {
    ($name:ident, $unit:literal) => {
        #[repr(transparent)]
        #[derive(
            ::derive_more::Add,
            ::derive_more::AddAssign,
            ::derive_more::From,
            ::derive_more::FromStr,
            ::derive_more::Into,
            ::derive_more::Neg,
            ::derive_more::Sub,
            ::derive_more::SubAssign,
            ::derive_more::Sum,
            ::serde::Deserialize,
            ::serde::Serialize,
            ::std::clone::Clone,
            ::std::marker::Copy,
        )]
        pub struct $name(pub f64);

        impl ::std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, formatter)?;
                write!(formatter, " {}", $unit)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Debug::fmt(&self.0, formatter)?;
                write!(formatter, "{}", $unit)
            }
        }

        impl $name {
            pub const ZERO: Self = Self(0.0);

            pub const fn min(self, rhs: Self) -> Self {
                Self(self.0.min(rhs.0))
            }

            pub const fn max(self, rhs: Self) -> Self {
                Self(self.0.max(rhs.0))
            }

            pub const fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }

        impl ::std::cmp::PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<::std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl ::std::cmp::Ord for $name {
            fn cmp(&self, other: &Self) -> ::std::cmp::Ordering {
                ::ordered_float::OrderedFloat(self.0).cmp(&::ordered_float::OrderedFloat(other.0))
            }
        }

        impl ::std::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                ::ordered_float::OrderedFloat(self.0).eq(&::ordered_float::OrderedFloat(other.0))
            }
        }

        impl ::std::cmp::Eq for $name {}
    };
}
