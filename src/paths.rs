//! URL paths of every page, shared by the router and the templates.

pub const HOME: &str = "/";
pub const REGISTER: &str = "/register";
pub const LOGIN: &str = "/login";
pub const LOGOUT: &str = "/logout";
pub const PROFILE: &str = "/profile";
pub const EDIT_PROFILE: &str = "/edit-profile";
pub const UPLOAD: &str = "/upload";
pub const FILES: &str = "/files";
pub const INEFFICIENT: &str = "/inefficient";
pub const COST_ANALYSIS: &str = "/cost-analysis";

pub fn delete_file(file_id: u64) -> String {
    format!("/delete-file/{}", file_id)
}

pub fn view_summary(file_id: u64) -> String {
    format!("/view-summary/{}", file_id)
}

pub fn view_details(file_id: u64) -> String {
    format!("/view-details/{}", file_id)
}

pub fn analyze_route(file_id: u64) -> String {
    format!("/analyze_route/{}", file_id)
}

pub fn analyze_cost(file_id: u64) -> String {
    format!("/analyze_cost/{}", file_id)
}

pub fn view_all_excel_data(file_id: u64) -> String {
    format!("/view-all-excel-data/{}", file_id)
}

pub fn inefficient(file_id: u64) -> String {
    format!("/inefficient/{}", file_id)
}

pub fn cost_analysis(file_id: u64) -> String {
    format!("/cost-analysis/{}", file_id)
}

pub fn report(file_id: u64) -> String {
    format!("/report/{}", file_id)
}

pub fn report_chart(file_id: u64) -> String {
    format!("/report/{}/chart.png", file_id)
}

pub fn download_pdf(file_id: u64) -> String {
    format!("/download_report_pdf/{}", file_id)
}

pub fn download_word(file_id: u64) -> String {
    format!("/download_report_word/{}", file_id)
}

pub fn download_excel(file_id: u64) -> String {
    format!("/download_report_excel/{}", file_id)
}
