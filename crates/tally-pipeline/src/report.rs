//! The report consumer: one bulk read, a handful of aggregates.

use std::{collections::BTreeMap, fmt};

use chrono::{Datelike as _, Weekday};
use tally_core::SalesRecord;

/// Aggregates over the whole table.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
  pub rows:                     usize,
  /// Total items sold per weekday, Monday first.
  pub items_by_weekday:         [(Weekday, i64); 7],
  /// Mean discount per weekday, Monday first; `None` for days with no sales.
  pub discount_by_weekday:      [(Weekday, Option<f64>); 7],
  pub items_by_region:          BTreeMap<String, i64>,
  pub mean_items_by_region:     BTreeMap<String, f64>,
  /// Median items sold per `(region, free_ship)`.
  pub median_items_by_shipping: BTreeMap<(String, bool), f64>,
  /// `None` for an empty table.
  pub average_discount:         Option<f64>,
}

const WEEK: [Weekday; 7] = [
  Weekday::Mon,
  Weekday::Tue,
  Weekday::Wed,
  Weekday::Thu,
  Weekday::Fri,
  Weekday::Sat,
  Weekday::Sun,
];

pub fn summarize(records: &[SalesRecord]) -> Summary {
  let mut items_by_weekday = WEEK.map(|day| (day, 0));
  let mut weekday_discounts = [(0.0, 0usize); 7];
  let mut regions: BTreeMap<String, (i64, usize)> = BTreeMap::new();
  let mut shipping: BTreeMap<(String, bool), Vec<i64>> = BTreeMap::new();
  let mut discount_total = 0.0;

  for r in records {
    let day = r.sale_date.weekday().num_days_from_monday() as usize;
    items_by_weekday[day].1 += r.items_sold;
    weekday_discounts[day].0 += r.discount;
    weekday_discounts[day].1 += 1;

    let entry = regions.entry(r.region.clone()).or_default();
    entry.0 += r.items_sold;
    entry.1 += 1;

    shipping
      .entry((r.region.clone(), r.free_ship))
      .or_default()
      .push(r.items_sold);

    discount_total += r.discount;
  }

  let mut discount_by_weekday = WEEK.map(|day| (day, None));
  for (slot, (total, n)) in discount_by_weekday.iter_mut().zip(weekday_discounts) {
    slot.1 = (n > 0).then(|| total / n as f64);
  }

  let items_by_region = regions
    .iter()
    .map(|(region, (items, _))| (region.clone(), *items))
    .collect();
  let mean_items_by_region = regions
    .into_iter()
    .map(|(region, (items, n))| (region, items as f64 / n as f64))
    .collect();
  let median_items_by_shipping = shipping
    .into_iter()
    .map(|(group, mut items)| (group, median(&mut items)))
    .collect();

  let average_discount =
    (!records.is_empty()).then(|| discount_total / records.len() as f64);

  Summary {
    rows: records.len(),
    items_by_weekday,
    discount_by_weekday,
    items_by_region,
    mean_items_by_region,
    median_items_by_shipping,
    average_discount,
  }
}

/// Median of a non-empty group; the mean of the middle pair for even sizes.
fn median(items: &mut [i64]) -> f64 {
  items.sort_unstable();
  let mid = items.len() / 2;
  if items.len() % 2 == 0 {
    (items[mid - 1] + items[mid]) as f64 / 2.0
  } else {
    items[mid] as f64
  }
}

impl fmt::Display for Summary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "rows: {}", self.rows)?;

    writeln!(f, "items sold by weekday:")?;
    for (day, items) in &self.items_by_weekday {
      writeln!(f, "  {day}  {items}")?;
    }

    writeln!(f, "average discount by weekday:")?;
    for (day, discount) in &self.discount_by_weekday {
      match discount {
        Some(d) => writeln!(f, "  {day}  {d:.3}")?,
        None => writeln!(f, "  {day}  n/a")?,
      }
    }

    writeln!(f, "items sold by region:")?;
    for (region, items) in &self.items_by_region {
      let mean = self.mean_items_by_region.get(region).copied().unwrap_or_default();
      writeln!(f, "  {region:<12} {items:>8}  (mean {mean:.2})")?;
    }

    writeln!(f, "median items sold by region and free shipping:")?;
    for ((region, free_ship), median) in &self.median_items_by_shipping {
      let shipping = if *free_ship { "free" } else { "paid" };
      writeln!(f, "  {region:<12} {shipping}  {median:.1}")?;
    }

    match self.average_discount {
      Some(d) => writeln!(f, "average discount: {d:.3}"),
      None => writeln!(f, "average discount: n/a"),
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn sale(y: i32, m: u32, d: u32, region: &str, items_sold: i64, discount: f64) -> SalesRecord {
    SalesRecord {
      sale_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
      product_id: 1,
      region: region.into(),
      free_ship: false,
      discount,
      items_sold,
      ingested_at: None,
    }
  }

  #[test]
  fn aggregates_by_weekday_and_region() {
    // 2024-01-15 is a Monday, 2024-01-21 a Sunday.
    let records = [
      sale(2024, 1, 15, "East", 4, 0.1),
      sale(2024, 1, 15, "West", 2, 0.0),
      sale(2024, 1, 21, "East", 6, 0.2),
      sale(2024, 1, 17, "West", 1, 0.1),
    ];
    let s = summarize(&records);

    assert_eq!(s.rows, 4);
    assert_eq!(s.items_by_weekday[0], (Weekday::Mon, 6));
    assert_eq!(s.items_by_weekday[2], (Weekday::Wed, 1));
    assert_eq!(s.items_by_weekday[6], (Weekday::Sun, 6));
    assert_eq!(s.items_by_weekday[1].1, 0);
    assert_eq!(s.mean_items_by_region["East"], 5.0);
    assert_eq!(s.mean_items_by_region["West"], 1.5);
    assert!((s.average_discount.unwrap() - 0.1).abs() < 1e-9);
  }

  #[test]
  fn discount_by_weekday_skips_empty_days() {
    let records = [
      sale(2024, 1, 15, "East", 4, 0.1),
      sale(2024, 1, 22, "East", 4, 0.3),
      sale(2024, 1, 19, "West", 1, 0.0),
    ];
    let s = summarize(&records);

    let (day, monday) = s.discount_by_weekday[0];
    assert_eq!(day, Weekday::Mon);
    assert!((monday.unwrap() - 0.2).abs() < 1e-9);
    assert_eq!(s.discount_by_weekday[4], (Weekday::Fri, Some(0.0)));
    assert_eq!(s.discount_by_weekday[1], (Weekday::Tue, None));
  }

  #[test]
  fn totals_and_medians_by_region() {
    let mut records = vec![
      sale(2024, 1, 15, "East", 1, 0.0),
      sale(2024, 1, 16, "East", 9, 0.0),
      sale(2024, 1, 17, "East", 4, 0.0),
      sale(2024, 1, 18, "East", 2, 0.0),
      sale(2024, 1, 15, "West", 5, 0.0),
    ];
    records[3].free_ship = true;

    let s = summarize(&records);
    assert_eq!(s.items_by_region["East"], 16);
    assert_eq!(s.items_by_region["West"], 5);

    // Paid East group is [1, 4, 9]; free East group is [2].
    assert_eq!(s.median_items_by_shipping[&("East".to_string(), false)], 4.0);
    assert_eq!(s.median_items_by_shipping[&("East".to_string(), true)], 2.0);
    assert_eq!(s.median_items_by_shipping[&("West".to_string(), false)], 5.0);
  }

  #[test]
  fn median_of_even_group_is_the_middle_mean() {
    assert_eq!(median(&mut [7, 1, 3, 5]), 4.0);
    assert_eq!(median(&mut [2]), 2.0);
  }

  #[test]
  fn empty_table() {
    let s = summarize(&[]);
    assert_eq!(s.rows, 0);
    assert!(s.mean_items_by_region.is_empty());
    assert!(s.items_by_region.is_empty());
    assert!(s.median_items_by_shipping.is_empty());
    assert!(s.discount_by_weekday.iter().all(|(_, d)| d.is_none()));
    assert_eq!(s.average_discount, None);
    assert!(s.items_by_weekday.iter().all(|(_, n)| *n == 0));
    assert!(s.to_string().contains("average discount: n/a"));
  }

  #[test]
  fn plain_text_starts_monday() {
    let text = summarize(&[sale(2024, 1, 16, "East", 3, 0.0)]).to_string();
    let weekday_lines: Vec<&str> = text
      .lines()
      .skip_while(|l| !l.starts_with("items sold by weekday"))
      .skip(1)
      .take(7)
      .collect();
    assert!(weekday_lines[0].trim_start().starts_with("Mon"));
    assert!(weekday_lines[1].contains('3'));
    assert!(weekday_lines[6].trim_start().starts_with("Sun"));
  }
}
