use tracing::debug;

use crate::models::filter::{Domain, FilterSpec, FilterState, Selection, WidgetKind};
use crate::models::query::{Predicate, Test};

/// 把筛选状态翻译成一个合取谓词
///
/// 纯函数: 同样的 specs 和 state 总是得到同样的谓词，子条件按 specs 的顺序排列。
/// 覆盖整个取值范围的选择不产生子条件。
pub fn compose(specs: &[FilterSpec], state: &FilterState) -> Predicate {
    let mut predicate = Predicate::all();
    for spec in specs {
        let Some(selection) = state.get(spec.name()) else {
            continue;
        };
        if selection.is_empty() {
            continue;
        }
        if !selection.fits(spec.widget) {
            debug!("列 {} 的选择与控件 {:?} 不匹配，已忽略", spec.name(), spec.widget);
            continue;
        }
        if let Some(test) = clause_for(spec, selection) {
            predicate = predicate.and(spec.name(), test);
        }
    }
    predicate
}

fn clause_for(spec: &FilterSpec, selection: &Selection) -> Option<Test> {
    match (spec.widget, selection) {
        (WidgetKind::Multiselect, Selection::Values { values }) => {
            let mut values = values.clone();
            values.sort();
            values.dedup();
            if let Domain::Discrete(domain) = &spec.domain {
                if !domain.is_empty() && domain.iter().all(|d| values.binary_search(d).is_ok()) {
                    return None;
                }
            }
            Some(Test::In { values })
        }
        (WidgetKind::Range, Selection::Range { min, max }) => {
            if let Domain::Numeric(Some(b)) = &spec.domain {
                if *min <= b.min && *max >= b.max {
                    return None;
                }
            }
            Some(Test::Between { min: *min, max: *max })
        }
        (WidgetKind::DateRange, Selection::DateRange { start, end }) => {
            if let Domain::Date(Some(b)) = &spec.domain {
                if *start <= b.min && *end >= b.max {
                    return None;
                }
            }
            Some(Test::DateBetween {
                start: *start,
                end: *end,
            })
        }
        (WidgetKind::Radio, Selection::Flag { value }) => Some(Test::Equals { value: *value }),
        (WidgetKind::FreeText, Selection::Text { text }) => Some(Test::Contains {
            text: text.trim().to_string(),
        }),
        _ => None,
    }
}
