pub(crate) use crate::{
    Interface, NormalizedMac, PairId, PairStatus, TdrPair, TdrResult, config::DeviceFamily,
};

pub(crate) use tracing::{debug, trace, warn};

pub(crate) use regex::Regex;

pub(crate) use std::sync::LazyLock;
