//! 记录类型名 <-> 表名 的转换
//!
//! 大写字母和数字各自开启一个新段，小写字母延续当前段：
//! `Abc1dKdata` -> `abc_1d_kdata`，反向时每段首字母大写后拼接。

pub fn to_table_name(domain_name: &str) -> String {
    let mut segments: Vec<String> = Vec::new();
    for ch in domain_name.chars() {
        if ch.is_ascii_uppercase() || ch.is_ascii_digit() || segments.is_empty() {
            segments.push(String::new());
        }
        if let Some(last) = segments.last_mut() {
            last.push(ch.to_ascii_lowercase());
        }
    }
    segments.join("_")
}

pub fn to_domain_name(table_name: &str) -> String {
    table_name
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_table_name() {
        assert_eq!(to_table_name("Abc"), "abc");
        assert_eq!(to_table_name("ABCD"), "a_b_c_d");
        assert_eq!(to_table_name("12345"), "1_2_3_4_5");
        assert_eq!(to_table_name("AbcD"), "abc_d");
        assert_eq!(to_table_name("AbcDe"), "abc_de");
        assert_eq!(to_table_name("Abc1D"), "abc_1_d");
        assert_eq!(to_table_name("Abc1dKdata"), "abc_1d_kdata");
        assert_eq!(to_table_name("Stock1dKdata"), "stock_1d_kdata");
    }

    #[test]
    fn test_to_domain_name() {
        assert_eq!(to_domain_name("abc"), "Abc");
        assert_eq!(to_domain_name("a_b_c_d"), "ABCD");
        assert_eq!(to_domain_name("1_2_3_4_5"), "12345");
        assert_eq!(to_domain_name("abc_d"), "AbcD");
        assert_eq!(to_domain_name("abc_de"), "AbcDe");
        assert_eq!(to_domain_name("abc_1_d"), "Abc1D");
        assert_eq!(to_domain_name("abc_1d_kdata"), "Abc1dKdata");
    }

    #[test]
    fn test_round_trip() {
        for name in [
            "Stock",
            "Stock1dKdata",
            "Index1wkKdata",
            "StockTickData",
            "Abc1D",
            "ABCD",
            "Etf15mKdata",
            "abc",
            "X9",
        ] {
            let table = to_table_name(name);
            assert_eq!(to_table_name(&to_domain_name(&table)), table, "{}", name);
        }
    }
}
