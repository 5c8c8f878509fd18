//! Built-in catalogue of site categories that can be blocked in one step.

use log::info;

use crate::error::{AppError, Result};
use crate::models::{BlockedItem, ItemType};
use crate::store::{keys, PolicyStore};

pub struct BlockCategory {
    pub id: &'static str,
    pub name: &'static str,
    pub domains: &'static [&'static str],
}

pub const BLOCK_CATEGORIES: &[BlockCategory] = &[
    BlockCategory {
        id: "social",
        name: "Social Media",
        domains: &[
            "facebook.com", "instagram.com", "twitter.com", "x.com", "tiktok.com",
            "snapchat.com", "pinterest.com", "linkedin.com", "tumblr.com", "reddit.com",
            "discord.com", "telegram.org", "whatsapp.com", "threads.net", "mastodon.social",
        ],
    },
    BlockCategory {
        id: "video",
        name: "Video & Streaming",
        domains: &[
            "youtube.com", "netflix.com", "twitch.tv", "hulu.com", "disneyplus.com",
            "primevideo.com", "hbomax.com", "peacocktv.com", "dailymotion.com", "vimeo.com",
            "crunchyroll.com", "funimation.com", "pluto.tv", "tubi.tv", "paramount.com",
        ],
    },
    BlockCategory {
        id: "gaming",
        name: "Gaming",
        domains: &[
            "store.steampowered.com", "epicgames.com", "roblox.com", "miniclip.com",
            "poki.com", "armorgames.com", "kongregate.com", "itch.io", "gog.com",
            "origin.com", "battlenet.com", "ubisoft.com", "ea.com", "gamespot.com", "ign.com",
        ],
    },
    BlockCategory {
        id: "news",
        name: "News & Media",
        domains: &[
            "cnn.com", "foxnews.com", "bbc.com", "nytimes.com", "theguardian.com",
            "washingtonpost.com", "huffpost.com", "buzzfeed.com", "dailymail.co.uk",
            "nbcnews.com", "abcnews.go.com", "cbsnews.com", "usatoday.com", "reuters.com",
            "apnews.com",
        ],
    },
    BlockCategory {
        id: "shopping",
        name: "Shopping",
        domains: &[
            "amazon.com", "ebay.com", "etsy.com", "walmart.com", "target.com",
            "aliexpress.com", "shein.com", "wish.com", "bestbuy.com", "newegg.com",
            "wayfair.com", "overstock.com", "zappos.com", "asos.com", "zara.com",
        ],
    },
    BlockCategory {
        id: "adult",
        name: "Adult Content",
        domains: &[
            "pornhub.com", "xvideos.com", "xnxx.com", "redtube.com", "youporn.com",
            "xhamster.com", "tube8.com", "spankbang.com", "eporner.com", "txxx.com",
            "drtuber.com", "slutload.com", "keezmovies.com", "beeg.com", "tnaflix.com",
        ],
    },
    BlockCategory {
        id: "gambling",
        name: "Gambling",
        domains: &[
            "draftkings.com", "fanduel.com", "betmgm.com", "caesars.com", "pokerstars.com",
            "bet365.com", "888casino.com", "williamhill.com", "ladbrokes.com", "coral.co.uk",
        ],
    },
];

pub fn find_category(id: &str) -> Option<&'static BlockCategory> {
    BLOCK_CATEGORIES.iter().find(|c| c.id == id)
}

/// New domain items for every category domain not already listed.
pub fn expand_category(
    category: &BlockCategory,
    existing: &[BlockedItem],
    now_ms: i64,
) -> Vec<BlockedItem> {
    category
        .domains
        .iter()
        .filter(|domain| {
            !existing
                .iter()
                .any(|item| item.item_type == ItemType::Domain && item.matches_domain(domain))
        })
        .map(|domain| BlockedItem::new(domain, ItemType::Domain, now_ms))
        .collect()
}

/// Add a whole category to the block list. Returns the number of items added.
pub fn block_category(store: &PolicyStore, id: &str, now_ms: i64) -> Result<usize> {
    let category = find_category(id).ok_or(AppError::NotFound { entity: "Category" })?;

    let added = store.update::<keys::BlockedItems, _>(|items| {
        let new_items = expand_category(category, items, now_ms);
        let count = new_items.len();
        items.extend(new_items);
        count
    })?;

    info!("Blocked category {} ({added} new item(s))", category.name);
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_store;

    #[test]
    fn test_category_ids_are_unique() {
        let mut ids: Vec<&str> = BLOCK_CATEGORIES.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), BLOCK_CATEGORIES.len());
    }

    #[test]
    fn test_expand_skips_existing_domains() {
        let category = find_category("social").unwrap();
        let existing = vec![
            BlockedItem::new("www.reddit.com", ItemType::Domain, 0),
            BlockedItem::new("x.com", ItemType::Keyword, 0),
        ];

        let items = expand_category(category, &existing, 7);

        assert_eq!(items.len(), category.domains.len() - 1);
        assert!(items.iter().all(|i| i.url != "reddit.com"));
        assert!(items.iter().any(|i| i.url == "x.com"));
        assert!(items.iter().all(|i| i.created_at == 7 && !i.limit_only));
    }

    #[test]
    fn test_block_category_is_idempotent() {
        let (store, _dir) = setup_test_store();

        let first = block_category(&store, "gambling", 0).unwrap();
        let second = block_category(&store, "gambling", 0).unwrap();

        assert_eq!((first, second), (10, 0));
        assert_eq!(store.get::<keys::BlockedItems>().unwrap().len(), 10);
    }

    #[test]
    fn test_unknown_category() {
        let (store, _dir) = setup_test_store();
        assert!(matches!(
            block_category(&store, "hobbies", 0),
            Err(AppError::NotFound { .. })
        ));
    }
}
