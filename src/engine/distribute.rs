use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::quota::AccountUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Fill the account with the most remaining quota first.
    Fast,
    /// Round-robin across eligible accounts in URL order.
    Even,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Fast => "fast",
            Policy::Even => "even",
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Policy::Fast
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub account_id: Uuid,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DistributionPlan {
    pub assignments: Vec<Assignment>,
    /// URLs no account had capacity for. They stay queued for the next
    /// scheduling cycle; never dropped.
    pub unassigned: Vec<String>,
}

impl DistributionPlan {
    pub fn assigned_count(&self) -> usize {
        self.assignments.iter().map(|a| a.urls.len()).sum()
    }
}

/// Split URLs across accounts with remaining quota. Remaining is taken from
/// the usage snapshot once, at planning time.
///
/// The even policy deliberately does not cap assignments by per-account
/// remaining during planning; the queue processor's dispatch-time quota
/// check defers over-assigned items instead (see DESIGN.md).
pub fn distribute(
    usages: &[AccountUsage],
    urls: &[String],
    policy: Policy,
) -> DistributionPlan {
    let eligible: Vec<&AccountUsage> = usages.iter().filter(|u| u.remaining() > 0).collect();
    if eligible.is_empty() || urls.is_empty() {
        return DistributionPlan {
            assignments: Vec::new(),
            unassigned: urls.to_vec(),
        };
    }

    match policy {
        Policy::Fast => {
            let mut order: Vec<usize> = (0..eligible.len()).collect();
            order.sort_by_key(|&i| std::cmp::Reverse(eligible[i].remaining()));

            let mut assignments: Vec<Assignment> = Vec::new();
            let mut unassigned = Vec::new();
            let mut urls_iter = urls.iter();

            'outer: for &i in &order {
                let capacity = eligible[i].remaining();
                let mut bucket = Vec::new();
                while (bucket.len() as i64) < capacity {
                    match urls_iter.next() {
                        Some(url) => bucket.push(url.clone()),
                        None => {
                            if !bucket.is_empty() {
                                assignments.push(Assignment {
                                    account_id: eligible[i].account.id,
                                    urls: bucket,
                                });
                            }
                            break 'outer;
                        }
                    }
                }
                if !bucket.is_empty() {
                    assignments.push(Assignment {
                        account_id: eligible[i].account.id,
                        urls: bucket,
                    });
                }
            }

            unassigned.extend(urls_iter.cloned());
            DistributionPlan {
                assignments,
                unassigned,
            }
        }
        Policy::Even => {
            let mut buckets: Vec<Vec<String>> = vec![Vec::new(); eligible.len()];
            for (idx, url) in urls.iter().enumerate() {
                buckets[idx % eligible.len()].push(url.clone());
            }
            let assignments = eligible
                .iter()
                .zip(buckets)
                .filter(|(_, urls)| !urls.is_empty())
                .map(|(usage, urls)| Assignment {
                    account_id: usage.account.id,
                    urls,
                })
                .collect();
            DistributionPlan {
                assignments,
                unassigned: Vec::new(),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountAllocation {
    pub account_id: Uuid,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAllocation {
    pub date: NaiveDate,
    pub allocations: Vec<AccountAllocation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    pub total: i64,
    pub deliverable_today: i64,
    pub days_needed: i64,
    pub days: Vec<DayAllocation>,
}

/// Multi-day projection: how much lands today, how many quota-days the
/// workload spans, and a day-by-day allocation table. Purely derived from
/// the usage snapshot; nothing is mutated.
///
/// Day 0 works with today's remaining quota, later days with full limits.
/// `days_needed` is total over the summed daily limits, so the schedule
/// table can run one day longer when today is already partly spent.
pub fn project(
    total: i64,
    usages: &[AccountUsage],
    today: NaiveDate,
    policy: Policy,
) -> Projection {
    let sum_remaining: i64 = usages.iter().map(|u| u.remaining()).sum();
    let sum_limits: i64 = usages.iter().map(|u| u.limit()).sum();
    let deliverable_today = total.min(sum_remaining);

    let days_needed = if total <= 0 || sum_limits <= 0 {
        0
    } else {
        (total + sum_limits - 1) / sum_limits
    };

    let mut days = Vec::new();
    if sum_limits > 0 {
        let mut left = total;
        let mut day_offset: i64 = 0;
        while left > 0 {
            let caps: Vec<i64> = if day_offset == 0 {
                usages.iter().map(|u| u.remaining()).collect()
            } else {
                usages.iter().map(|u| u.limit()).collect()
            };
            let counts = allocate_day(left, &caps, policy);
            let allocated: i64 = counts.iter().sum();
            if allocated > 0 {
                days.push(DayAllocation {
                    date: today + chrono::Days::new(day_offset as u64),
                    allocations: usages
                        .iter()
                        .zip(&counts)
                        .filter(|&(_, &c)| c > 0)
                        .map(|(u, &c)| AccountAllocation {
                            account_id: u.account.id,
                            count: c,
                        })
                        .collect(),
                });
                left -= allocated;
            }
            day_offset += 1;
        }
    }

    Projection {
        total,
        deliverable_today,
        days_needed,
        days,
    }
}

/// How many of `left` URLs each account takes on a day with the given
/// per-account capacities.
fn allocate_day(left: i64, caps: &[i64], policy: Policy) -> Vec<i64> {
    let mut counts = vec![0i64; caps.len()];
    let mut left = left;

    match policy {
        Policy::Fast => {
            let mut order: Vec<usize> = (0..caps.len()).collect();
            order.sort_by_key(|&i| std::cmp::Reverse(caps[i]));
            for &i in &order {
                if left == 0 {
                    break;
                }
                let take = left.min(caps[i]);
                counts[i] = take;
                left -= take;
            }
        }
        Policy::Even => {
            // Single-unit rounds keep the split as even as capacities allow.
            while left > 0 {
                let mut progressed = false;
                for i in 0..caps.len() {
                    if left == 0 {
                        break;
                    }
                    if counts[i] < caps[i] {
                        counts[i] += 1;
                        left -= 1;
                        progressed = true;
                    }
                }
                if !progressed {
                    break;
                }
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::quota::usage_fixture;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://example.com/page-{i}")).collect()
    }

    #[test]
    fn fast_fills_largest_account_first() {
        // remaining {200, 150, 0}, 250 URLs
        let usages = vec![
            usage_fixture(200, 0, 0),
            usage_fixture(200, 50, 0),
            usage_fixture(200, 200, 0),
        ];
        let plan = distribute(&usages, &urls(250), Policy::Fast);

        assert_eq!(plan.assignments.len(), 2);
        assert_eq!(plan.assignments[0].account_id, usages[0].account.id);
        assert_eq!(plan.assignments[0].urls.len(), 200);
        assert_eq!(plan.assignments[1].account_id, usages[1].account.id);
        assert_eq!(plan.assignments[1].urls.len(), 50);
        assert!(plan.unassigned.is_empty());
    }

    #[test]
    fn fast_leaves_overflow_unassigned() {
        let usages = vec![usage_fixture(200, 190, 0)];
        let plan = distribute(&usages, &urls(25), Policy::Fast);

        assert_eq!(plan.assigned_count(), 10);
        assert_eq!(plan.unassigned.len(), 15);
        // Nothing is ever dropped.
        assert_eq!(plan.assigned_count() + plan.unassigned.len(), 25);
    }

    #[test]
    fn fast_never_assigns_to_exhausted_accounts() {
        let usages = vec![usage_fixture(200, 200, 0), usage_fixture(200, 0, 0)];
        let plan = distribute(&usages, &urls(10), Policy::Fast);
        assert!(plan
            .assignments
            .iter()
            .all(|a| a.account_id == usages[1].account.id));
    }

    #[test]
    fn even_round_robins_in_url_order() {
        let usages = vec![usage_fixture(200, 0, 0), usage_fixture(200, 0, 0)];
        let all = urls(5);
        let plan = distribute(&usages, &all, Policy::Even);

        assert_eq!(plan.assignments.len(), 2);
        assert_eq!(plan.assignments[0].urls, vec![all[0].clone(), all[2].clone(), all[4].clone()]);
        assert_eq!(plan.assignments[1].urls, vec![all[1].clone(), all[3].clone()]);
        assert!(plan.unassigned.is_empty());
    }

    #[test]
    fn even_is_not_capped_at_planning_time() {
        // Account 2 has 1 remaining but still receives its round-robin share;
        // the dispatch-time quota check sorts it out later.
        let usages = vec![usage_fixture(200, 0, 0), usage_fixture(200, 199, 0)];
        let plan = distribute(&usages, &urls(10), Policy::Even);
        assert_eq!(plan.assignments[1].urls.len(), 5);
    }

    #[test]
    fn empty_inputs_return_empty_plans() {
        let plan = distribute(&[], &urls(3), Policy::Fast);
        assert!(plan.assignments.is_empty());
        assert_eq!(plan.unassigned.len(), 3);

        let usages = vec![usage_fixture(200, 0, 0)];
        let plan = distribute(&usages, &[], Policy::Even);
        assert!(plan.assignments.is_empty());
        assert!(plan.unassigned.is_empty());
    }

    #[test]
    fn projection_day_counts() {
        let today = "2026-08-08".parse::<NaiveDate>().unwrap();
        // limits 200+100, remaining 150+100; 500 URLs
        let usages = vec![usage_fixture(200, 50, 0), usage_fixture(100, 0, 0)];
        let proj = project(500, &usages, today, Policy::Fast);

        assert_eq!(proj.total, 500);
        assert_eq!(proj.deliverable_today, 250);
        // ceil(500 / 300) = 2 quota-days of work
        assert_eq!(proj.days_needed, 2);

        // Day 0: 250 (remaining), day 1: 250 of the 300 limit.
        assert_eq!(proj.days.len(), 2);
        let day0: i64 = proj.days[0].allocations.iter().map(|a| a.count).sum();
        let day1: i64 = proj.days[1].allocations.iter().map(|a| a.count).sum();
        assert_eq!(day0, 250);
        assert_eq!(day1, 250);
        assert_eq!(proj.days[1].date, today + chrono::Days::new(1));
    }

    #[test]
    fn projection_zero_total() {
        let usages = vec![usage_fixture(200, 0, 0)];
        let today = "2026-08-08".parse::<NaiveDate>().unwrap();
        let proj = project(0, &usages, today, Policy::Even);
        assert_eq!(proj.days_needed, 0);
        assert!(proj.days.is_empty());
    }

    #[test]
    fn projection_without_accounts() {
        let today = "2026-08-08".parse::<NaiveDate>().unwrap();
        let proj = project(10, &[], today, Policy::Fast);
        assert_eq!(proj.deliverable_today, 0);
        assert_eq!(proj.days_needed, 0);
        assert!(proj.days.is_empty());
    }
}
