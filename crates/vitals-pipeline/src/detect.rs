//! Change detection: decide whether a freshly parsed dataset warrants
//! derivation and republication.

/// Compare a dataset's maximum timestamp against the previously recorded
/// `update_time` for the series.
///
/// `force_refresh` overrides the comparison so stale data is republished
/// anyway, except in debug (dry-run) mode, where force is ignored so a dry
/// run never pretends there is publication work to do.
pub fn is_newer(new_time: i64, recorded_time: i64, force_refresh: bool, debug: bool) -> bool {
    new_time > recorded_time || (force_refresh && !debug)
}
