quantity!(Percent, "%");

impl Percent {
    pub const HUNDRED: Self = Self(100.0);
}
