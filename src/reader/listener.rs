use crate::query::DataFrame;

/// 读取器数据变化的订阅者
///
/// 回调在读取器所在任务中同步执行，实现方不要在里面做耗时操作。
pub trait DataListener: Send + Sync {
    /// 首次加载完成；注册时若读取器已有数据也会立即回放一次
    fn on_data_loaded(&self, data: &DataFrame);

    /// 一次 move_on 结束且有任何分类发生变化时调用，参数为合并后的完整数据
    fn on_data_changed(&self, data: &DataFrame);

    /// 某个分类追加了新行，`added` 只包含新增的部分
    fn on_category_data_added(&self, category: &str, added: &DataFrame) {
        let _ = (category, added);
    }
}
