use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use serde_json::Value;
use tempfile::TempDir;

const CLEARED_ENV: &[&str] = &[
    "PERFDASH_HOME",
    "DATABASE_URL",
    "PERFDASH_PERFORMANCE_CSV",
    "PERFDASH_TASKS_CSV",
    "PERFDASH_CHAT_API_KEY",
    "PERFDASH_CHAT_BASE_URL",
    "PERFDASH_CHAT_MODEL",
    "RUST_LOG",
];

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_perfdash"))
}

fn run_cmd_with_env(dir: &TempDir, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(bin_path());
    cmd.current_dir(dir.path()).arg("--home").arg(dir.path());
    for key in CLEARED_ENV {
        cmd.env_remove(key);
    }
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.args(args);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.output().expect("run command")
}

fn run_cmd(dir: &TempDir, args: &[&str]) -> Output {
    run_cmd_with_env(dir, args, &[])
}

fn output_stdout(output: Output) -> String {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout utf8")
}

fn output_json(output: Output) -> Value {
    serde_json::from_str(&output_stdout(output)).expect("json output")
}

fn output_stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn parse_task_id(stdout: &str) -> i64 {
    let prefix = "Created task ID: ";
    let rest = stdout.trim().strip_prefix(prefix).expect("task output");
    let id_str = rest.split(':').next().expect("task id");
    id_str.trim().parse().expect("task id parse")
}

fn create_task(dir: &TempDir, name: &str, unit: &str, status: &str) -> i64 {
    let stdout = output_stdout(run_cmd(
        dir,
        &[
            "task", "add", name, "--unit", unit, "--start", "2025-01-06", "--status", status,
        ],
    ));
    parse_task_id(&stdout)
}

/// One sales category and one disbursement category; current year reported
/// through August.
fn write_performance(dir: &TempDir) {
    let mut csv = String::from("bulan,Categori Produk,Kinerja 2024,Kinerja 2025,Target Tahun Ini\n");
    for month in 1..=12 {
        let current = if month <= 8 { 300 + month * 10 } else { 0 };
        csv.push_str(&format!(
            "{month},1. LOANS,{},{current},400\n",
            100 + month * 10
        ));
        let disbursed = if month <= 8 { 50 } else { 0 };
        csv.push_str(&format!(
            "{month},17. PENYALURAN DANA NASIONAL,40,{disbursed},60\n"
        ));
    }
    fs::write(dir.path().join("performance.csv"), csv).expect("write performance");
}

fn approx(value: &Value, expected: f64) {
    let actual = value.as_f64().expect("number");
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn task_add_list_and_show() {
    let dir = TempDir::new().expect("temp dir");
    let id = create_task(&dir, "Quarterly audit", "Finance", "in-progress");

    let list = output_stdout(run_cmd(&dir, &["task", "list"]));
    assert!(list.contains("Quarterly audit"));
    assert!(list.contains("In Progress"));
    assert!(list.contains("Ongoing"));

    output_stdout(run_cmd(
        &dir,
        &["subtask", "add", &id.to_string(), "Fieldwork", "--start", "2025-01-06", "--end", "2025-01-10"],
    ));
    let show = output_stdout(run_cmd(&dir, &["task", "show", &id.to_string()]));
    assert!(show.contains("Task Name: Quarterly audit"));
    assert!(show.contains("Due Date: Ongoing"));
    assert!(show.contains("- Fieldwork 2025-01-06 .. 2025-01-10 (5 days)"));
}

#[test]
fn task_update_rejects_due_before_start() {
    let dir = TempDir::new().expect("temp dir");
    let id = create_task(&dir, "Launch", "Sales", "not-started");
    let output = run_cmd(&dir, &["task", "update", &id.to_string(), "--due", "2024-12-31"]);
    assert!(!output.status.success());
    assert!(output_stderr(&output).contains("Invalid input"));

    output_stdout(run_cmd(
        &dir,
        &["task", "update", &id.to_string(), "--status", "completed"],
    ));
    let list = output_stdout(run_cmd(&dir, &["task", "list", "--status", "completed"]));
    assert!(list.contains("Launch"));
}

#[test]
fn board_expands_units_and_filters_by_whole_unit() {
    let dir = TempDir::new().expect("temp dir");
    let campaign = create_task(&dir, "Campaign", "Sales & Marketing", "in-progress");
    create_task(&dir, "Audit", "Finance", "completed");

    let board = output_json(run_cmd(&dir, &["task", "board", "--json"]));
    assert_eq!(board["overview"]["total"], 2);
    assert_eq!(board["overview"]["completed"], 1);
    let units: Vec<&str> = board["units"]
        .as_array()
        .expect("units")
        .iter()
        .map(|unit| unit.as_str().expect("unit"))
        .collect();
    assert_eq!(units, vec!["Finance", "Marketing", "Sales"]);
    assert_eq!(board["by_unit"].as_array().expect("by unit").len(), 3);

    let filtered = output_json(run_cmd(
        &dir,
        &[
            "task",
            "board",
            "--json",
            "--unit",
            "marketing",
            "--expand",
            &campaign.to_string(),
        ],
    ));
    let rows = filtered["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["task_name"], "Campaign");
    assert_eq!(rows[0]["expanded"], true);

    let partial = output_json(run_cmd(&dir, &["task", "board", "--json", "--unit", "Market"]));
    assert!(partial["rows"].as_array().expect("rows").is_empty());
}

#[test]
fn task_remove_drops_subtasks() {
    let dir = TempDir::new().expect("temp dir");
    let id = create_task(&dir, "Cleanup", "Ops", "not-started");
    output_stdout(run_cmd(
        &dir,
        &["subtask", "add", &id.to_string(), "Step", "--start", "2025-02-01", "--end", "2025-02-02"],
    ));
    let removed = output_stdout(run_cmd(&dir, &["task", "remove", &id.to_string()]));
    assert!(removed.contains("subtasks: 1"));

    let output = run_cmd(&dir, &["task", "show", &id.to_string()]);
    assert!(!output.status.success());
    assert!(output_stderr(&output).contains("Not found"));
}

#[test]
fn export_then_import_into_fresh_home() {
    let source = TempDir::new().expect("temp dir");
    create_task(&source, "Pipeline review", "Sales & Marketing", "completed");
    let export_path = source.path().join("export.csv");
    output_stdout(run_cmd(
        &source,
        &["task", "export", export_path.to_str().expect("path")],
    ));
    assert!(export_path.is_file());

    let target = TempDir::new().expect("temp dir");
    let imported = output_stdout(run_cmd(
        &target,
        &["task", "import", export_path.to_str().expect("path")],
    ));
    assert!(imported.contains("Imported 1 tasks"));
    let list = output_stdout(run_cmd(&target, &["task", "list"]));
    assert!(list.contains("Pipeline review"));
}

#[test]
fn board_falls_back_to_csv_when_store_is_unreachable() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(
        dir.path().join("tasks.csv"),
        "id,task_name,assigned_unit,start_date,due_date,status\n\
         7,Branch visit,Sales,2025/03/01,not a date,Bogus\n",
    )
    .expect("write tasks csv");

    let output = run_cmd_with_env(
        &dir,
        &["task", "board", "--json"],
        &[("DATABASE_URL", "not-a-url")],
    );
    let stderr = output_stderr(&output);
    assert!(stderr.contains("Warning: task store unavailable"), "{stderr}");
    let board = output_json(output);
    let row = &board["rows"][0];
    assert_eq!(row["id"], 7);
    assert_eq!(row["start_date"], "2025-03-01");
    assert_eq!(row["due_date"], Value::Null);
    assert_eq!(row["status"], "Not Started");
}

#[test]
fn metrics_split_disbursement_categories() {
    let dir = TempDir::new().expect("temp dir");
    write_performance(&dir);

    let report = output_json(run_cmd(
        &dir,
        &["metrics", "--as-of", "2025-08-15", "--json"],
    ));
    approx(&report["excluding"]["mtd_total"], 380.0);
    approx(&report["excluding"]["mtd_target"], 400.0);
    approx(&report["excluding"]["mtd_achievement"], 95.0);
    approx(&report["excluding"]["ytd_total"], 2760.0);
    approx(&report["excluding"]["ytd_target"], 4800.0);
    approx(&report["including"]["mtd_total"], 430.0);
    approx(&report["including"]["mtd_target"], 460.0);
    approx(&report["including"]["ytd_total"], 3160.0);

    let text = output_stdout(run_cmd(&dir, &["metrics", "--as-of", "2025-08-15"]));
    assert!(text.contains("Total: 380"));
    assert!(text.contains("Ach: 95.0%"));
}

#[test]
fn category_selection_narrows_the_excluding_view() {
    let dir = TempDir::new().expect("temp dir");
    write_performance(&dir);
    let categories = output_stdout(run_cmd(&dir, &["categories"]));
    let lines: Vec<&str> = categories.lines().collect();
    assert_eq!(
        lines,
        vec!["1. LOANS", "17. PENYALURAN DANA NASIONAL (disbursement)"]
    );

    let report = output_json(run_cmd(
        &dir,
        &[
            "metrics",
            "--as-of",
            "2025-08-15",
            "--json",
            "--category",
            "17. PENYALURAN DANA NASIONAL",
        ],
    ));
    approx(&report["excluding"]["mtd_total"], 0.0);
    approx(&report["excluding"]["mtd_achievement"], 0.0);
}

#[test]
fn forecast_projects_remaining_months() {
    let dir = TempDir::new().expect("temp dir");
    write_performance(&dir);

    let output = output_json(run_cmd(
        &dir,
        &["forecast", "--as-of", "2025-09-18", "--json"],
    ));
    let report = &output["excluding"];
    assert_eq!(report["through_month"], 8);
    let timeline = report["timeline"].as_array().expect("timeline");
    assert_eq!(timeline.len(), 24);
    assert_eq!(timeline[20]["label"], "Sep 2025");
    // Same month last year plus twelve months of trend.
    approx(&timeline[20]["forecast"], 390.0);
    assert_eq!(timeline[7 + 12]["forecast"], Value::Null);
    approx(&report["actual_to_date"], 2760.0);
    approx(&report["forecast_remaining"], 390.0 + 400.0 + 410.0 + 420.0);

    let including = &output["including"];
    approx(&including["disbursement_actual"], 400.0);
    approx(&including["disbursement_forecast"], 0.0);
}

#[test]
fn redistribute_spreads_shortfall_by_target_weight() {
    let dir = TempDir::new().expect("temp dir");
    write_performance(&dir);

    let result = output_json(run_cmd(
        &dir,
        &["redistribute", "--as-of", "2025-09-18", "--json"],
    ));
    assert_eq!(result["cutoff_month"], 8);
    approx(&result["shortfall"], 440.0);
    assert_eq!(result["over_achieved"], false);
    let months = result["months"].as_array().expect("months");
    assert_eq!(months.len(), 4);
    for month in months {
        approx(&month["weight"], 0.25);
        approx(&month["adjusted_target"], 510.0);
    }

    let text = output_stdout(run_cmd(
        &dir,
        &["redistribute", "--cutoff-month", "12"],
    ));
    assert!(text.contains("No open months."));
}

#[test]
fn redistribute_can_include_disbursement_categories() {
    let dir = TempDir::new().expect("temp dir");
    write_performance(&dir);

    let result = output_json(run_cmd(
        &dir,
        &[
            "redistribute",
            "--as-of",
            "2025-09-18",
            "--include-disbursement",
            "--json",
        ],
    ));
    // 8 * 460 target against 2760 + 8 * 50 actual.
    approx(&result["ytd_target"], 3680.0);
    approx(&result["ytd_actual"], 3160.0);
    approx(&result["shortfall"], 520.0);
    for month in result["months"].as_array().expect("months") {
        approx(&month["original_target"], 460.0);
        approx(&month["adjusted_target"], 590.0);
    }
}

#[test]
fn countdown_reports_workdays() {
    let dir = TempDir::new().expect("temp dir");
    let countdown = output_json(run_cmd(
        &dir,
        &["countdown", "--as-of", "2025-09-18", "--json"],
    ));
    assert_eq!(countdown["days_to_end_of_month"], 12);
    assert_eq!(countdown["total_days_month"], 30);
    assert_eq!(countdown["workdays_to_end_of_month"], 9);
    assert_eq!(countdown["total_workdays_month"], 22);
    assert_eq!(countdown["days_to_end_of_year"], 104);
    assert_eq!(countdown["total_workdays_year"], 261);
}

#[test]
fn chat_requires_api_key() {
    let dir = TempDir::new().expect("temp dir");
    write_performance(&dir);
    let output = run_cmd(&dir, &["chat", "How", "are", "loans", "doing?"]);
    assert!(!output.status.success());
    assert!(output_stderr(&output).contains("PERFDASH_CHAT_API_KEY"));
}

#[test]
fn missing_performance_file_is_reported() {
    let dir = TempDir::new().expect("temp dir");
    let output = run_cmd(&dir, &["metrics"]);
    assert!(!output.status.success());
    assert!(output_stderr(&output).contains("cannot open performance data"));
}
