use std::cmp::Ordering;

/// digit runs are left-padded to this width so that lexical order matches
/// numeric order
const PAD_WIDTH: usize = 30;

/// sort key: full-width digits folded to ASCII, digit runs zero-padded
pub fn natural_key(s: &str) -> String {
    let mut key = String::with_capacity(s.len() + PAD_WIDTH);
    let mut run = String::new();
    for c in s.chars() {
        let c = match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            _ => c,
        };
        if c.is_ascii_digit() {
            run.push(c);
            continue;
        }
        flush_run(&mut key, &mut run);
        key.push(c);
    }
    flush_run(&mut key, &mut run);
    key
}

fn flush_run(key: &mut String, run: &mut String) {
    if run.is_empty() {
        return;
    }
    for _ in run.len()..PAD_WIDTH {
        key.push('0');
    }
    key.push_str(run);
    run.clear();
}

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b))
}

/// stable sort of `items` by the natural key of `key(item)`
pub fn sort_natural<T>(items: &mut [T], key: impl Fn(&T) -> String) {
    items.sort_by_cached_key(|item| natural_key(&key(item)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(input: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = input.iter().map(|s| s.to_string()).collect();
        sort_natural(&mut v, |s| s.clone());
        v
    }

    #[test]
    fn key_pads_digit_runs() {
        assert_eq!(natural_key("p2"), format!("p{}2", "0".repeat(29)));
        assert_eq!(natural_key("abc"), "abc");
        assert_eq!(natural_key(""), "");
    }

    #[test]
    fn key_folds_full_width_digits() {
        assert_eq!(natural_key("第１２話"), natural_key("第12話"));
        assert_eq!(natural_key("０９"), natural_key("09"));
    }

    #[test]
    fn key_keeps_long_runs_intact() {
        let long = "1".repeat(35);
        assert_eq!(natural_key(&long), long);
    }

    #[test]
    fn numeric_order() {
        assert_eq!(
            sorted(&["page10", "page2", "page1"]),
            vec!["page1", "page2", "page10"]
        );
    }

    #[test]
    fn full_width_mixed_with_ascii() {
        assert_eq!(
            sorted(&["第10話", "第２話", "第1話"]),
            vec!["第1話", "第２話", "第10話"]
        );
    }

    #[test]
    fn multiple_runs() {
        assert_eq!(
            sorted(&["v2c10", "v10c1", "v2c9"]),
            vec!["v2c9", "v2c10", "v10c1"]
        );
    }

    #[test]
    fn paths_sort_parent_before_child() {
        assert_eq!(
            sorted(&["root/ch10", "root/ch2/extra", "root", "root/ch2"]),
            vec!["root", "root/ch2", "root/ch2/extra", "root/ch10"]
        );
    }

    #[test]
    fn equal_keys_keep_input_order() {
        let mut v = vec![("1", 'a'), ("１", 'b'), ("01", 'c')];
        sort_natural(&mut v, |(s, _)| s.to_string());
        assert_eq!(v.iter().map(|(_, c)| *c).collect::<Vec<_>>(), vec!['a', 'b', 'c']);
    }

    #[test]
    fn cmp_matches_key_order() {
        assert_eq!(natural_cmp("a9", "a10"), Ordering::Less);
        assert_eq!(natural_cmp("a10", "a９"), Ordering::Greater);
        assert_eq!(natural_cmp("x", "x"), Ordering::Equal);
    }
}
