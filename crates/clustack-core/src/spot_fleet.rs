//! Spot fleet node pools
//!
//! A launch specification inherits its root volume and bid price from the pool-level
//! unit values, scaled by its weighted capacity, unless it overrides them.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::config::{RawLaunchSpecification, RawSpotFleet};
use crate::error::{CoreError, Result};
use crate::spec::{uses_provisioned_iops, Volume};

pub const DEFAULT_UNIT_SPOT_PRICE: &str = "0.06";
pub const DEFAULT_ROOT_VOLUME_TYPE: &str = "gp2";
pub const DEFAULT_UNIT_ROOT_VOLUME_SIZE: u32 = 30;

/// Exact decimal bid price, rendered without exponent or trailing zeros
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Price(BigDecimal);

impl Price {
    pub fn times(&self, factor: u32) -> Price {
        Price(&self.0 * &BigDecimal::from(factor))
    }
}

impl FromStr for Price {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || format!("`{}` is not a valid price", s);
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(invalid());
        }
        BigDecimal::from_str(s).map(Price).map_err(|_| invalid())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.normalized().to_plain_string())
    }
}

impl Serialize for Price {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// `unit * weight`, or a capacity error naming `path` when it leaves the u32 range
fn scaled(unit: u32, weight: u32, path: String, what: &str) -> Result<u32> {
    unit.checked_mul(weight).ok_or_else(|| {
        let actual = u64::from(unit) * u64::from(weight);
        CoreError::capacity(
            path,
            format!(
                "{} scaled by weighted capacity {} is {}, above the limit of {}",
                what,
                weight,
                actual,
                u32::MAX
            ),
            usize::try_from(actual).unwrap_or(usize::MAX),
            u32::MAX as usize,
        )
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpecification {
    pub weighted_capacity: u32,
    pub instance_type: String,
    pub spot_price: Price,
    pub root_volume: Volume,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotFleet {
    pub target_capacity: u32,
    pub unit_spot_price: Price,
    pub iam_fleet_role_arn: Option<String>,
    pub root_volume_type: String,
    pub unit_root_volume_size: u32,
    pub unit_root_volume_iops: u32,
    pub launch_specifications: Vec<LaunchSpecification>,
}

impl SpotFleet {
    /// Apply pool-level defaults to every launch specification
    pub fn from_raw(raw: &RawSpotFleet, path: &str) -> Result<Self> {
        let unit_spot_price: Price = raw
            .spot_price
            .as_deref()
            .unwrap_or(DEFAULT_UNIT_SPOT_PRICE)
            .parse()
            .map_err(|e: String| CoreError::schema(format!("{}.spotPrice", path), e))?;
        let root_volume_type = raw
            .root_volume_type
            .clone()
            .unwrap_or_else(|| DEFAULT_ROOT_VOLUME_TYPE.to_string());
        let unit_root_volume_size = raw
            .unit_root_volume_size
            .unwrap_or(DEFAULT_UNIT_ROOT_VOLUME_SIZE);
        let unit_root_volume_iops = raw.unit_root_volume_iops.unwrap_or(0);

        let mut fleet = SpotFleet {
            target_capacity: raw.target_capacity.unwrap_or(0),
            unit_spot_price,
            iam_fleet_role_arn: raw.iam_fleet_role_arn.clone(),
            root_volume_type,
            unit_root_volume_size,
            unit_root_volume_iops,
            launch_specifications: Vec::new(),
        };

        let raw_specs = if raw.launch_specifications.is_empty() {
            default_launch_specifications()
        } else {
            raw.launch_specifications.clone()
        };
        for (i, spec) in raw_specs.iter().enumerate() {
            let spec_path = format!("{}.launchSpecifications[{}]", path, i);
            fleet.launch_specifications.push(fleet.inherit(spec, &spec_path)?);
        }

        Ok(fleet)
    }

    fn inherit(&self, raw: &RawLaunchSpecification, path: &str) -> Result<LaunchSpecification> {
        let weight = raw.weighted_capacity;
        let raw_volume = raw.root_volume.clone().unwrap_or_default();

        let kind = raw_volume
            .kind
            .unwrap_or_else(|| self.root_volume_type.clone());
        let size = match raw_volume.size {
            Some(size) => size,
            None => scaled(
                self.unit_root_volume_size,
                weight,
                format!("{}.rootVolume.size", path),
                "unitRootVolumeSize",
            )?,
        };
        let inherits_iops = uses_provisioned_iops(&kind) || kind == "gp3";
        let iops = match raw_volume.iops {
            Some(iops) => iops,
            None if inherits_iops => scaled(
                self.unit_root_volume_iops,
                weight,
                format!("{}.rootVolume.iops", path),
                "unitRootVolumeIOPS",
            )?,
            None => 0,
        };
        let root_volume = Volume { size, kind, iops };
        root_volume.check(&format!("{}.rootVolume", path))?;

        let spot_price = match &raw.spot_price {
            Some(price) => price
                .parse()
                .map_err(|e: String| CoreError::schema(format!("{}.spotPrice", path), e))?,
            None => self.unit_spot_price.times(weight),
        };

        Ok(LaunchSpecification {
            weighted_capacity: weight,
            instance_type: raw.instance_type.clone(),
            spot_price,
            root_volume,
        })
    }
}

fn default_launch_specifications() -> Vec<RawLaunchSpecification> {
    [(1, "c4.large"), (2, "c4.xlarge")]
        .into_iter()
        .map(|(weight, instance_type)| RawLaunchSpecification {
            weighted_capacity: weight,
            instance_type: instance_type.to_string(),
            spot_price: None,
            root_volume: None,
        })
        .collect()
}
