use foundation::{EARTH_RADIUS, SphericalPose, Viewpoint};

/// One line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `lon lat alt`: degrees, degrees, meters above the surface.
    View(Viewpoint),
    /// `time t0 t1`: epoch seconds.
    Time { t0: i64, t1: i64 },
    /// `mode`: cycle the time mode.
    Mode,
    /// `stats`: log session counters.
    Stats,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some(&first) = words.first() else {
        return Ok(None);
    };

    let command = match (first, words.len()) {
        ("mode", 1) => Command::Mode,
        ("stats", 1) => Command::Stats,
        ("quit" | "exit", 1) => Command::Quit,
        ("time", 3) => Command::Time {
            t0: parse_num(words[1], "t0")?,
            t1: parse_num(words[2], "t1")?,
        },
        (_, 3) => {
            let lon: f64 = parse_num(words[0], "lon")?;
            let lat: f64 = parse_num(words[1], "lat")?;
            let alt: f64 = parse_num(words[2], "alt")?;
            if !(-90.0..=90.0).contains(&lat) {
                return Err(format!("latitude {lat} out of range"));
            }
            Command::View(Viewpoint::from_pose(SphericalPose::new(
                lon.to_radians(),
                lat.to_radians(),
                EARTH_RADIUS + alt,
            )))
        }
        _ => return Err(format!("unrecognized command: {line:?}")),
    };
    Ok(Some(command))
}

fn parse_num<T: std::str::FromStr>(word: &str, what: &str) -> Result<T, String> {
    word.parse()
        .map_err(|_| format!("{what} is not a number: {word:?}"))
}

#[cfg(test)]
mod tests {
    use super::{Command, parse_command};
    use foundation::{EARTH_RADIUS, VIEW_RADIUS_MAX};
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_keywords() {
        assert_eq!(parse_command("  "), Ok(None));
        assert_eq!(parse_command("mode"), Ok(Some(Command::Mode)));
        assert_eq!(parse_command("stats"), Ok(Some(Command::Stats)));
        assert_eq!(parse_command("exit"), Ok(Some(Command::Quit)));
        assert_eq!(
            parse_command("time -5 10"),
            Ok(Some(Command::Time { t0: -5, t1: 10 }))
        );
    }

    #[test]
    fn parses_viewpoints_in_degrees() {
        let Ok(Some(Command::View(v))) = parse_command("90 0 1000") else {
            panic!("expected a viewpoint");
        };
        assert!((v.pose().lon - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((v.radius() - (EARTH_RADIUS + 1000.0)).abs() < 1e-6);

        let Ok(Some(Command::View(far))) = parse_command("0 0 1e12") else {
            panic!("expected a viewpoint");
        };
        assert_eq!(far.radius(), VIEW_RADIUS_MAX);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_command("1 2").is_err());
        assert!(parse_command("a b c").is_err());
        assert!(parse_command("0 91 0").is_err());
        assert!(parse_command("time x 1").is_err());
    }
}
