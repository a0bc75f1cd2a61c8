use caseless::default_case_fold_str;

use crate::models::{Event, Match};

/// Case-folded substring match of every artist against every event title.
///
/// One event can match several artists and one artist several events. Output
/// follows event order, then artist order. Blank artists never match.
pub fn match_events(events: &[Event], artists: &[String]) -> Vec<Match> {
    let folded_artists: Vec<(&str, String)> = artists
        .iter()
        .map(|artist| artist.trim())
        .filter(|artist| !artist.is_empty())
        .map(|artist| (artist, default_case_fold_str(artist)))
        .collect();

    let mut matches = Vec::new();
    for event in events {
        let title = default_case_fold_str(&event.title);
        for (artist, folded) in &folded_artists {
            if title.contains(folded.as_str()) {
                matches.push(Match {
                    artist: artist.to_string(),
                    event: event.clone(),
                });
            }
        }
    }
    matches
}
