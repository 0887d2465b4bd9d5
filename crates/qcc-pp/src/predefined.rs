//! Predefined macros.
//!
//! Injected when the preprocessor is created: the standard-mandated set
//! (`__STDC__`, `__STDC_VERSION__` for modern standards, `__DATE__`,
//! `__TIME__`) plus vendor identification. `__FILE__` and `__LINE__` are
//! not in the table; they resolve dynamically at each expansion site.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::Preprocessor;
use qcc_util::{Feature, Standard};

impl<'a> Preprocessor<'a> {
    pub(crate) fn define_predefined(&mut self) {
        let origin = "<built-in>";
        self.define_object("__STDC__", "1", origin);
        if let Some(version) = standard_of(self.features).and_then(Standard::version_macro) {
            self.define_object("__STDC_VERSION__", &format!("{}L", version), origin);
        }
        self.define_object("__STDC_HOSTED__", "1", origin);
        self.define_object("__QCC__", "1", origin);

        let (date, time) = date_time_now();
        self.define_object("__DATE__", &format!("\"{}\"", date), origin);
        self.define_object("__TIME__", &format!("\"{}\"", time), origin);
    }
}

/// Recover the announced standard from the effective feature set, for
/// `__STDC_VERSION__`. Overrides can make the set match no base
/// standard exactly, so marker features decide: digit separators mark
/// C23, `_Generic` marks C11/C17 (announced as C17), `restrict` marks
/// C99. GNU 89 trips none of them and announces no version.
fn standard_of(features: qcc_util::FeatureSet) -> Option<Standard> {
    if features.contains(Feature::DigitSeparators) {
        Some(Standard::C23)
    } else if features.contains(Feature::Generic) {
        Some(Standard::C17)
    } else if features.contains(Feature::Restrict) {
        Some(Standard::C99)
    } else {
        None
    }
}

/// `__DATE__` ("Mmm dd yyyy", day space-padded) and `__TIME__`
/// ("hh:mm:ss") for the current moment, UTC.
fn date_time_now() -> (String, String) {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let date = format!("{} {:2} {}", MONTHS[(month - 1) as usize], day, year);
    let time = format!(
        "{:02}:{:02}:{:02}",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    );
    (date, time)
}

/// Days-since-epoch to (year, month, day) in the proleptic Gregorian
/// calendar.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{preprocess, spellings};

    #[test]
    fn test_civil_from_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
    }

    #[test]
    fn test_stdc_is_one() {
        let (toks, _) = preprocess("int v = __STDC__;\n");
        assert_eq!(spellings(&toks), ["int", "v", "=", "1", ";"]);
    }

    #[test]
    fn test_date_time_shape() {
        let (date, time) = date_time_now();
        assert_eq!(time.len(), 8);
        assert_eq!(&time[2..3], ":");
        assert!(date.len() >= 10);
    }

    #[test]
    fn test_vendor_macro() {
        let (toks, _) = preprocess("#ifdef __QCC__\nint vendor;\n#endif\n");
        assert_eq!(spellings(&toks), ["int", "vendor", ";"]);
    }
}
