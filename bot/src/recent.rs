use anyhow::Result;
use etterna::{Api, Score, ScoreQuery, Song, SortColumn};

use crate::db::Store;
use crate::models::TrackedUser;

/// How many of the newest scores are scanned for a valid one.
pub const RECENT_LOOKUP_COUNT: u32 = 10;

/// The user's most recent valid play, with the detail-only fields filled in.
///
/// `Ok(None)` when none of the newest scores is valid.
pub async fn recent_play(api: &dyn Api, etterna_id: i64) -> etterna::Result<Option<Score>> {
    let query = ScoreQuery::new(etterna_id)
        .count(RECENT_LOOKUP_COUNT)
        .sort(SortColumn::Date, false);

    let scores = api.get_scores(&query).await?;

    // A zero overall marks a failed or invalid play; the detail's flag is authoritative.
    for mut score in scores.into_iter().filter(|s| s.msd.overall > 0.0) {
        let detail = api.get_score_detail(&score.key).await?;

        if !detail.valid {
            tracing::debug!(etterna_id, key = %score.key, "skipping score flagged invalid");
            continue;
        }

        merge_detail(&mut score, &detail);
        return Ok(Some(score));
    }

    Ok(None)
}

/// Copies the fields only the detail endpoint has onto a listed score.
pub fn merge_detail(score: &mut Score, detail: &Score) {
    score.max_combo = detail.max_combo;
    score.mines_hit = detail.mines_hit;
    score.mods = detail.mods.clone();
    score.date = detail.date;
    score.valid = detail.valid;
}

/// Cached user by name, fetching the profile and scraping the site ID on a miss.
pub async fn get_or_create_user(
    api: &dyn Api,
    store: &dyn Store,
    username: &str,
) -> Result<TrackedUser> {
    if let Some(user) = store.get_cached_user(username).await? {
        return Ok(user);
    }

    let profile = api.get_by_username(username).await?;
    let etterna_id = api.get_user_id(&profile.username).await?;
    let user = TrackedUser::from_profile(etterna_id, &profile);

    store.save_user(&user).await?;
    tracing::info!(username = %user.username, etterna_id, "cached new user");

    Ok(user)
}

pub async fn get_or_fetch_song(api: &dyn Api, store: &dyn Store, id: i64) -> Result<Song> {
    if let Some(song) = store.get_cached_song(id).await? {
        return Ok(song);
    }

    let song = api.get_song(id).await?;
    store.save_song(&song).await?;
    tracing::debug!(id, name = %song.name, "cached new song");

    Ok(song)
}
