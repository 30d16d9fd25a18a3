mod policy;

pub use policy::{POLICY_EXPIRE_IN_HOURS, SIGNING_ALGORITHM, SignedPolicy, create_policy};
pub(crate) use policy::signing_fields;
