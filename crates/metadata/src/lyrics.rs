/// Seconds between lines of a lyric file that carries no timestamps.
const UNTIMED_STEP: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LyricLine {
    pub time: f64,
    pub text: String,
}

/// Parses LRC text into timed lines. Metadata tags such as `[ar:...]` and
/// blank lines are dropped.
pub fn parse_lrc(content: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();
    for raw in content.lines() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match split_time_tag(raw) {
            Some((time, rest)) => {
                let text = rest.trim();
                if !text.is_empty() {
                    lines.push(LyricLine {
                        time,
                        text: text.to_string(),
                    });
                }
            }
            None => {
                if raw.starts_with('[') {
                    continue;
                }
                lines.push(LyricLine {
                    time: lines.len() as f64 * UNTIMED_STEP,
                    text: raw.to_string(),
                });
            }
        }
    }
    lines
}

/// Matches a leading `[mm:ss.xx]` or `[mm:ss.xxx]`.
fn split_time_tag(line: &str) -> Option<(f64, &str)> {
    let inner = line.strip_prefix('[')?;
    let (tag, rest) = inner.split_once(']')?;
    let (minutes, tail) = tag.split_once(':')?;
    let (seconds, fraction) = tail.split_once('.')?;
    let all_digits = |text: &str| text.bytes().all(|b| b.is_ascii_digit());
    if minutes.len() != 2 || seconds.len() != 2 || !(2..=3).contains(&fraction.len()) {
        return None;
    }
    if !all_digits(minutes) || !all_digits(seconds) || !all_digits(fraction) {
        return None;
    }
    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    let mut millis: f64 = fraction.parse().ok()?;
    if fraction.len() == 2 {
        millis *= 10.0;
    }
    Some((minutes * 60.0 + seconds + millis / 1000.0, rest))
}
