/// Process exit codes for `fu`.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    /// An entry or undo record failed, or there was nothing to act on.
    pub const OPERATIONAL_FAILURE: i32 = 1;
    /// Bad pattern, template or operation selection; nothing was changed.
    pub const INPUT_FAILURE: i32 = 2;
    /// The user declined a prompt.
    pub const ABORTED: i32 = 3;
}
