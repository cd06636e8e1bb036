//! 字幕片段提取
//!
//! 从 SRT 字幕中按顺序提取文本，作为批处理的任务列表。
//!
//! SRT 格式：
//! ```text
//! 1
//! 00:00:01,000 --> 00:00:03,500
//! 第一行
//! 第二行
//!
//! 2
//! ...
//! ```

/// 检查是否为时间轴行
#[inline]
fn is_timing_line(line: &str) -> bool {
    line.contains("-->")
}

/// 检查是否为序号行
#[inline]
fn is_index_line(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_digit())
}

/// 提取字幕文本片段
///
/// 每个字幕块的多行文本用空格拼接；空字幕块被跳过。
/// 时间轴之前的内容（序号、BOM）会被忽略。
pub fn extract_segments(content: &str) -> Vec<String> {
    let content = content.trim_start_matches('\u{feff}');
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_cue = false;

    let lines: Vec<&str> = content.lines().map(str::trim).collect();

    for (pos, &line) in lines.iter().enumerate() {
        if is_timing_line(line) {
            flush(&mut current, &mut segments);
            in_cue = true;
            continue;
        }

        if line.is_empty() {
            flush(&mut current, &mut segments);
            in_cue = false;
            continue;
        }

        if !in_cue {
            // 序号行或时间轴之前的杂项
            continue;
        }

        // 紧贴下一个字幕块的序号行（缺少空行分隔）不计入文本
        let next_is_timing = lines.get(pos + 1).is_some_and(|next| is_timing_line(next));
        if is_index_line(line) && next_is_timing {
            continue;
        }

        current.push(line);
    }

    flush(&mut current, &mut segments);
    segments
}

fn flush(current: &mut Vec<&str>, segments: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let text = current.join(" ");
    current.clear();
    let text = text.trim();
    if !text.is_empty() {
        segments.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_srt() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\nXin chào\n\n2\n00:00:02,500 --> 00:00:04,000\nĐây là câu thứ hai\n";
        assert_eq!(
            extract_segments(srt),
            vec!["Xin chào".to_string(), "Đây là câu thứ hai".to_string()]
        );
    }

    #[test]
    fn test_multiline_cue_is_joined() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\nline one\nline two\n\n";
        assert_eq!(extract_segments(srt), vec!["line one line two".to_string()]);
    }

    #[test]
    fn test_crlf_and_bom() {
        let srt = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nhello\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nworld\r\n";
        assert_eq!(
            extract_segments(srt),
            vec!["hello".to_string(), "world".to_string()]
        );
    }

    #[test]
    fn test_empty_cue_skipped() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\n\n2\n00:00:03,000 --> 00:00:04,000\nkept\n";
        assert_eq!(extract_segments(srt), vec!["kept".to_string()]);
    }

    #[test]
    fn test_numeric_text_inside_cue_is_kept() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\nthe year was\n1999\n";
        assert_eq!(extract_segments(srt), vec!["the year was 1999".to_string()]);
    }

    #[test]
    fn test_missing_blank_separator() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\nhello\n2\n00:00:03,000 --> 00:00:04,000\nworld\n";
        assert_eq!(
            extract_segments(srt),
            vec!["hello".to_string(), "world".to_string()]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_segments("").is_empty());
        assert!(extract_segments("\n\n").is_empty());
    }
}
