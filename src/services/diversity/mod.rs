// ============================================
// Diversity Pass
// ============================================
//
// Re-orders a score-sorted merge so no category or top tag dominates
// and no category runs more than `max_consecutive` slots in a row.
//
// Placement strategy per slot, first stage that yields an item wins:
// 1. Round-robin across categories, all constraints enforced; each
//    category walks a cursor down its own score-sorted sublist
// 2. Linear scan relaxing only the consecutive rule
// 3. Linear scan relaxing consecutive and category share, tag cap held
// 4. Unconstrained fill
//
// Filling the requested length always beats satisfying the caps, so a
// degenerate candidate set (one category, one tag) still produces a
// full feed.

use crate::config::DiversityConfig;
use crate::models::FeedItem;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relax {
    Consecutive,
    ConsecutiveAndCategory,
    All,
}

struct Caps {
    category: usize,
    tag: usize,
}

/// Mutable placement state threaded through the stages.
struct Placement {
    placed: Vec<bool>,
    order: Vec<usize>,
    category_counts: HashMap<String, usize>,
    tag_counts: HashMap<String, usize>,
    last_category: Option<String>,
    consecutive: usize,
}

impl Placement {
    fn new(len: usize) -> Self {
        Self {
            placed: vec![false; len],
            order: Vec::new(),
            category_counts: HashMap::new(),
            tag_counts: HashMap::new(),
            last_category: None,
            consecutive: 0,
        }
    }

    fn category_blocked(&self, category: &str, cap: usize) -> bool {
        self.category_counts.get(category).copied().unwrap_or(0) >= cap
    }

    fn consecutive_blocked(&self, category: &str, max_consecutive: usize) -> bool {
        self.last_category.as_deref() == Some(category) && self.consecutive >= max_consecutive
    }

    fn tag_blocked(&self, item: &FeedItem, cap: usize) -> bool {
        item.item
            .top_tag()
            .is_some_and(|tag| self.tag_counts.get(tag).copied().unwrap_or(0) >= cap)
    }

    fn place(&mut self, idx: usize, item: &FeedItem) {
        let category = item.item.category.as_str();

        self.placed[idx] = true;
        self.order.push(idx);
        *self.category_counts.entry(category.to_string()).or_insert(0) += 1;
        if let Some(tag) = item.item.top_tag() {
            *self.tag_counts.entry(tag.to_string()).or_insert(0) += 1;
        }

        if self.last_category.as_deref() == Some(category) {
            self.consecutive += 1;
        } else {
            self.consecutive = 1;
            self.last_category = Some(category.to_string());
        }
    }
}

pub struct DiversityPass {
    config: DiversityConfig,
}

impl DiversityPass {
    pub fn new(config: DiversityConfig) -> Self {
        Self { config }
    }

    /// Re-order `items` (score-sorted, oversized) into at most `limit`
    /// diversity-constrained slots.
    pub fn rerank(&self, items: Vec<FeedItem>, limit: usize) -> Vec<FeedItem> {
        if items.is_empty() || limit == 0 {
            return Vec::new();
        }

        let caps = Caps {
            category: (limit as f64 * self.config.max_category_share) as usize,
            tag: (limit as f64 * self.config.max_tag_share) as usize,
        };

        // Categories in first-appearance order; sublists stay score-sorted.
        let mut categories: Vec<String> = Vec::new();
        let mut by_category: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, feed_item) in items.iter().enumerate() {
            let category = feed_item.item.category.clone();
            by_category
                .entry(category.clone())
                .or_insert_with(|| {
                    categories.push(category);
                    Vec::new()
                })
                .push(idx);
        }

        let mut cursors: HashMap<String, usize> =
            categories.iter().map(|c| (c.clone(), 0)).collect();
        let mut rotation = 0usize;
        let mut placement = Placement::new(items.len());

        while placement.order.len() < limit && placement.order.len() < items.len() {
            let placed = self.rotate_once(
                &items,
                &categories,
                &by_category,
                &mut cursors,
                &mut rotation,
                &caps,
                &mut placement,
            ) || self.scan_once(&items, &caps, Relax::Consecutive, &mut placement)
                || self.scan_once(&items, &caps, Relax::ConsecutiveAndCategory, &mut placement)
                || self.scan_once(&items, &caps, Relax::All, &mut placement);

            if !placed {
                break;
            }
        }

        placement.order.truncate(limit);
        placement
            .order
            .into_iter()
            .map(|idx| items[idx].clone())
            .collect()
    }

    /// One full round-robin rotation. Returns true once a single item is
    /// placed. Cursors advance past placed and tag-blocked items, so a
    /// blocked item never wedges its category.
    #[allow(clippy::too_many_arguments)]
    fn rotate_once(
        &self,
        items: &[FeedItem],
        categories: &[String],
        by_category: &HashMap<String, Vec<usize>>,
        cursors: &mut HashMap<String, usize>,
        rotation: &mut usize,
        caps: &Caps,
        placement: &mut Placement,
    ) -> bool {
        for _ in 0..categories.len() {
            let category = &categories[*rotation % categories.len()];
            *rotation = (*rotation + 1) % categories.len();

            if placement.category_blocked(category, caps.category) {
                continue;
            }
            if placement.consecutive_blocked(category, self.config.max_consecutive) {
                continue;
            }

            let sublist = &by_category[category];
            let Some(cursor) = cursors.get_mut(category) else {
                continue;
            };
            while *cursor < sublist.len() && placement.placed[sublist[*cursor]] {
                *cursor += 1;
            }
            if *cursor >= sublist.len() {
                continue;
            }

            let idx = sublist[*cursor];
            *cursor += 1;

            if placement.tag_blocked(&items[idx], caps.tag) {
                continue;
            }

            placement.place(idx, &items[idx]);
            return true;
        }
        false
    }

    /// Linear fallback scan in score order with the given constraints
    /// relaxed.
    fn scan_once(
        &self,
        items: &[FeedItem],
        caps: &Caps,
        relax: Relax,
        placement: &mut Placement,
    ) -> bool {
        for (idx, feed_item) in items.iter().enumerate() {
            if placement.placed[idx] {
                continue;
            }

            let check_category = relax == Relax::Consecutive;
            let check_tag = relax != Relax::All;

            if check_category && placement.category_blocked(&feed_item.item.category, caps.category)
            {
                continue;
            }
            if check_tag && placement.tag_blocked(feed_item, caps.tag) {
                continue;
            }

            placement.place(idx, feed_item);
            return true;
        }
        false
    }
}
