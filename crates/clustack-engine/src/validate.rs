//! Platform limit checks applied while assembling stacks

use crate::error::{EngineError, Result};

/// Largest user-data payload EC2 accepts
pub const MAX_USER_DATA_BYTES: usize = 16384;

/// Security groups a user may attach on top of the cluster's own
pub const MAX_USER_SECURITY_GROUPS: usize = 4;

pub const MAX_IAM_ROLE_NAME_LEN: usize = 64;

/// Stand-in for the random suffix CloudFormation appends to nested stack names
const STACK_SUFFIX_SAMPLE: &str = "PRK1CVQNY7XZ";

/// Separators in `{cluster}-{stack}-{suffix}-{region}-{role}`
const ROLE_NAME_SEPARATORS: usize = 4;

pub fn check_user_data(path: &str, user_data: &str) -> Result<()> {
    let size = user_data.len();
    if size > MAX_USER_DATA_BYTES {
        return Err(EngineError::capacity(
            path,
            format!(
                "{}: rendered user-data is {} bytes. It exceeds the EC2 limit of {} bytes",
                path, size, MAX_USER_DATA_BYTES
            ),
            size,
            MAX_USER_DATA_BYTES,
        ));
    }
    Ok(())
}

pub fn check_security_groups(path: &str, user_security_groups: &[String]) -> Result<()> {
    let count = user_security_groups.len();
    if count > MAX_USER_SECURITY_GROUPS {
        return Err(EngineError::capacity(
            path,
            format!(
                "{}: number of user provided security groups must be less than or equal to {} but was {}",
                path, MAX_USER_SECURITY_GROUPS, count
            ),
            count,
            MAX_USER_SECURITY_GROUPS,
        ));
    }
    Ok(())
}

/// Check the name IAM will give a managed role
///
/// CloudFormation names the role `{cluster}-{nested stack}-{12 random}-{region}-{role}`.
pub fn check_iam_role_name(
    path: &str,
    cluster_name: &str,
    nested_stack: &str,
    region: &str,
    role_name: &str,
) -> Result<()> {
    let name = format!(
        "{}-{}-{}-{}-{}",
        cluster_name, nested_stack, STACK_SUFFIX_SAMPLE, region, role_name
    );
    let length = name.len();
    if length > MAX_IAM_ROLE_NAME_LEN {
        let budget = MAX_IAM_ROLE_NAME_LEN
            .saturating_sub(STACK_SUFFIX_SAMPLE.len() + region.len() + ROLE_NAME_SEPARATORS);
        return Err(EngineError::capacity(
            path,
            format!(
                "IAM role name(={}) will be {} characters long. It exceeds the AWS limit of {} characters: cluster name(={}) + nested stack name(={}) + managed iam role name(={}) should be less than or equal to {}",
                name, length, MAX_IAM_ROLE_NAME_LEN, cluster_name, nested_stack, role_name, budget
            ),
            length,
            MAX_IAM_ROLE_NAME_LEN,
        ));
    }
    Ok(())
}
