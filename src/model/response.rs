// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/model/response.rs - 视觉语言模型文本响应解析
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::model::DetectionBox;

static RESPONSE_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"```json\n(\[[\s\S]*\])\n```|(\[[\s\S]*\])").expect("响应解析正则表达式无效")
});

/// 从模型文本响应中提取检测框
///
/// 响应可以是 ```json 代码块、夹杂在文字中的 JSON 数组或者整段 JSON。
/// 数组元素为 `[ymin, xmin, ymax, xmax, label]`，坐标可以是数字或数字字符串，
/// 也接受存储格式的对象元素。无法解析时返回空列表。
pub fn parse_box_response(text: &str) -> Vec<DetectionBox> {
  let candidate = RESPONSE_ARRAY
    .captures(text)
    .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
    .map(|m| m.as_str())
    .unwrap_or(text);

  let items = match serde_json::from_str::<Value>(candidate) {
    Ok(Value::Array(items)) => items,
    Ok(other) => {
      warn!("响应不是数组: {}", other);
      return Vec::new();
    }
    Err(e) => {
      warn!("无法从响应中解析 JSON 数组: {}", e);
      return Vec::new();
    }
  };

  items.into_iter().filter_map(parse_item).collect()
}

fn parse_item(item: Value) -> Option<DetectionBox> {
  match item {
    Value::Array(ref values) if values.len() == 5 => {
      let coords = values[..4]
        .iter()
        .map(parse_coordinate)
        .collect::<Option<Vec<f32>>>();
      match (coords, values[4].as_str()) {
        (Some(c), Some(label)) => Some(DetectionBox::new(c[0], c[1], c[2], c[3], label)),
        _ => {
          warn!("跳过无效条目（坐标非数字或标签非字符串）: {}", item);
          None
        }
      }
    }
    Value::Object(_) => match serde_json::from_value::<DetectionBox>(item.clone()) {
      Ok(detection) => Some(detection),
      Err(e) => {
        warn!("跳过无效条目 {}: {}", item, e);
        None
      }
    },
    _ => {
      warn!("跳过无效条目（不是 5 元素数组）: {}", item);
      None
    }
  }
}

// 坐标按整数截断
fn parse_coordinate(value: &Value) -> Option<f32> {
  let number = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }?;
  number.is_finite().then(|| number.trunc() as f32)
}
