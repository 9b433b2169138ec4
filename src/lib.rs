/*!
# RetroTrack

A web application that finds inefficient deliveries in uploaded shipping
spreadsheets and reports what better routing would have saved.

## Overview

Users register, log in and upload Excel workbooks (PDF and Word files are
kept as records only). Each workbook is parsed once at upload time and its
data stored alongside the file record. From there a user can browse:

- the raw rows of every sheet
- the "Summary" sheet's per-category cost totals, with a bar chart
- the "BANG KE CHI TIET" order sheet with payment delays in days
- inefficient routes: deliveries more than 24 hours late, with an optimised
  drive time from the Geoapify routing API when a key is configured
- a report with metrics, tables and a cost-saved chart, downloadable as
  PDF, Word or Excel

## Architecture

### Data layer
- **model**: users, file records and the parsed dataset types
- **parser**: workbook reading with calamine
- **store**: JSON files for users and file records
- **saving**: parsed datasets as gzip-compressed bincode

### Analysis layer
- **optimizer**: the route optimisation trait and its Geoapify client
- **analysis**: report metrics and table rows
- **graph**: the cost-saved bar chart
- **downloader**: PDF, Word and Excel exports

### Web layer (`web` feature)
- **app**: router, shared state and page handlers (axum)
- **login**: accounts, password hashing and sessions
- **views** / **templates**: page models rendered with handlebars
- **flash**: one-shot notices across redirects

## Routes

- `/register`, `/login`, `/logout`, `/profile`, `/edit-profile`
- `/upload`, `/files`, `/delete-file/{id}`
- `/view-summary/{id}`, `/view-details/{id}`, `/view-all-excel-data/{id}`
- `/analyze_route/{id}`, `/analyze_cost/{id}`
- `/inefficient`, `/inefficient/{id}`, `/cost-analysis`, `/cost-analysis/{id}`
- `/report/{id}`, `/report/{id}/chart.png`
- `/download_report_pdf/{id}`, `/download_report_word/{id}`, `/download_report_excel/{id}`
*/

pub mod analysis;
pub mod downloader;
pub mod error;
pub mod format;
pub mod graph;
pub mod model;
pub mod optimizer;
pub mod parser;
pub mod saving;
pub mod store;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod flash;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod paths;
#[cfg(feature = "web")]
pub mod templates;
#[cfg(feature = "web")]
pub mod views;

pub use error::{AppError, Result};
