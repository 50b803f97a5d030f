/// Short indicator text for a dwell time: `"{s}s"` under a minute, `"{m}m"`
/// under an hour, `"{h}h"` otherwise. Always floors.
pub fn format_badge_text(total_secs: u64) -> String {
    if total_secs < 60 {
        format!("{total_secs}s")
    } else if total_secs < 3600 {
        format!("{}m", total_secs / 60)
    } else {
        format!("{}h", total_secs / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_at_unit_boundaries() {
        assert_eq!(format_badge_text(0), "0s");
        assert_eq!(format_badge_text(59), "59s");
        assert_eq!(format_badge_text(60), "1m");
        assert_eq!(format_badge_text(125), "2m");
        assert_eq!(format_badge_text(3599), "59m");
        assert_eq!(format_badge_text(3600), "1h");
        assert_eq!(format_badge_text(86_399), "23h");
    }
}
