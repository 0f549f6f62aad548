use anyhow::{bail, Context};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use fes_filter::{CompileContext, FeatureType, FilterRequest, ServiceConfig, SqlCompiler, FUNCTIONS};

const CONFIG_FILE: &str = "feature_types.json";

/// 加载要素类型配置，失败时使用内置演示配置
fn load_config() -> ServiceConfig {
    match ServiceConfig::from_json_file(CONFIG_FILE) {
        Ok(config) => {
            println!("✅ 使用JSON配置文件: {}", CONFIG_FILE);
            config
        }
        Err(e) => {
            println!("⚠️ 无法加载JSON配置文件 ({}), 使用默认配置", e);
            ServiceConfig::demo()
        }
    }
}

fn print_config(config: &ServiceConfig) {
    println!("\n[配置信息]:");
    for feature_type in &config.feature_types {
        let crs = feature_type
            .crs
            .as_ref()
            .map_or_else(|| "-".to_string(), |crs| crs.to_string());
        println!(
            "  {} -> 表 {}, 参考系 {}, 几何字段 {}",
            feature_type.name,
            feature_type.table_name(),
            crs,
            feature_type.geometry_field().unwrap_or("-")
        );
        for (name, mapping) in &feature_type.fields {
            println!("    {} -> {}", name, mapping.path);
        }
    }
}

fn print_help() {
    println!("输入一个 <fes:Filter> XML，或 `kvp:KEY=VALUE&...` 形式的查询参数");
    println!("  :type <名称>   切换要素类型");
    println!("  :functions    列出支持的函数");
    println!("  :help         显示帮助");
    println!("  :quit         退出");
}

/// 解析、编译并打印一条过滤条件
fn run_filter(input: &str, feature_type: &FeatureType, compiler: &SqlCompiler) -> anyhow::Result<()> {
    let request = match input.strip_prefix("kvp:") {
        Some(query) => FilterRequest::from_query_string(query.trim())?,
        None => FilterRequest {
            filter: Some(fes_filter::Filter::from_xml(input)?),
            sort_by: None,
        },
    };
    println!("✓ 成功解析过滤条件");

    let plan = request.compile(&CompileContext::new(feature_type))?;
    println!("\n[查询计划]:");
    println!("{}", serde_json::to_string_pretty(&plan).context("无法序列化查询计划")?);

    let result = compiler.compile(&plan, feature_type)?;
    println!("\n[生成的 SQL]:");
    println!("{}", result.sql);
    if !result.custom_lookups.is_empty() {
        let names: Vec<_> = result.custom_lookups.iter().map(|kind| kind.name()).collect();
        println!("需要的自定义查找: {}", names.join(", "));
    }
    if !result.optimizations.is_empty() {
        println!("\n[应用的优化]:");
        for opt in &result.optimizations {
            println!("• {:?}", opt);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fes_filter=info")),
        )
        .init();

    println!("--- FES 2.0 Filter 到查询计划编译器 ---");
    let config = load_config();
    print_config(&config);

    let Some(first) = config.feature_types.first() else {
        bail!("配置中没有任何要素类型");
    };
    let mut current = first.name.clone();
    let compiler = SqlCompiler::new();

    println!();
    print_help();

    let mut rl = DefaultEditor::new().context("无法初始化命令行编辑器")?;
    loop {
        match rl.readline(&format!("{}> ", current)) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line.split_once(' ').unwrap_or((line, "")) {
                    (":quit" | ":q", _) => break,
                    (":help", _) => print_help(),
                    (":functions", _) => {
                        for def in FUNCTIONS.iter() {
                            let args: Vec<_> = def
                                .arguments
                                .iter()
                                .map(|(name, ty)| format!("{}: {}", name, ty))
                                .collect();
                            println!("  {}({}) -> {}", def.name, args.join(", "), def.returns);
                        }
                    }
                    (":type", name) => match config.feature_type(name.trim()) {
                        Some(feature_type) => current = feature_type.name.clone(),
                        None => println!("✗ 未知的要素类型: {}", name.trim()),
                    },
                    _ => {
                        let Some(feature_type) = config.feature_type(&current) else {
                            bail!("要素类型 {} 不存在", current);
                        };
                        if let Err(e) = run_filter(line, feature_type, &compiler) {
                            println!("✗ 失败: {:#}", e);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => println!("使用 :quit 或 Ctrl-D 退出"),
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("读取输入失败"),
        }
    }
    Ok(())
}
