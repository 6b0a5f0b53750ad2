/// Read-through caching over an optional Redis cache.
///
/// With `Some(cache)` the key is looked up first; on a miss the block is
/// awaited and its value queued for a background write. A failing cache read
/// is logged and treated as a miss. With `None` the block is simply awaited.
///
/// Must be used inside an `async` function returning `AppResult`.
///
/// # Arguments
/// * `$cache`: an `Option<&Cache>`
/// * `$key`: the `CacheKey` to read and write
/// * `$ttl`: time-to-live in seconds
/// * `$block`: future producing `AppResult<T>` on a miss
///
/// # Example
/// ```rust,ignore
/// let details: AnimeDetails = cached!(self.cache.as_ref(), key, DETAILS_CACHE_TTL, async {
///     self.fetch_remote(title).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        match $cache {
            Some(cache) => match cache.get_from_cache(&key).await {
                Ok(Some(hit)) => {
                    tracing::debug!(key = %key, "Cache hit");
                    Ok(hit)
                }
                lookup => {
                    if let Err(e) = lookup {
                        tracing::warn!(key = %key, error = %e, "Cache read failed, computing value");
                    }
                    let value = $block.await?;
                    cache.set_in_background(&key, &value, $ttl);
                    Ok(value)
                }
            },
            None => $block.await,
        }
    }};
}
